//! `03-kubernetes-initialize`: namespace, GPU drivers and cluster-wide defaults.

use super::{KUBERNETES_INITIALIZE, cluster_objects, kubeconfig_path};
use crate::checks::readiness_policy;
use crate::kubectl::Kubectl;
use crate::terraform::TerraformStageBody;
use async_trait::async_trait;
use nebari_config::{NebariConfig, ProviderKind};
use nebari_core::{NebariError, Result, StageFactory, StageOutputs};
use nebari_tofu::ExecEnv;
use serde_json::{Map, Value, json};

fn gpu_settings(config: &NebariConfig) -> Result<(bool, Vec<String>)> {
    Ok(match config.provider {
        ProviderKind::Gcp => {
            let enabled = config.google_cloud_platform()?.node_groups.values().any(|group| {
                group
                    .extra
                    .get("guest_accelerators")
                    .and_then(Value::as_array)
                    .is_some_and(|accelerators| !accelerators.is_empty())
            });
            (enabled, Vec::new())
        }
        ProviderKind::Aws => {
            let groups = &config.amazon_web_services()?.node_groups;
            (
                groups.values().any(|group| group.gpu),
                groups.keys().cloned().collect(),
            )
        }
        _ => (false, Vec::new()),
    })
}

pub struct KubernetesInitialize {
    kubectl: Kubectl,
}

impl KubernetesInitialize {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl TerraformStageBody for KubernetesInitialize {
    const NAME: &'static str = KUBERNETES_INITIALIZE;
    const PRIORITY: i32 = 30;

    fn input_schema(&self) -> &'static [&'static str] {
        &["project_name", "namespace", "provider", "external_container_reg"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[super::INFRASTRUCTURE]
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        cluster_objects(KUBERNETES_INITIALIZE, &factory.config)
    }

    fn input_vars(&self, factory: &StageFactory, _outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let config = &factory.config;
        let (gpu_enabled, gpu_node_group_names) = gpu_settings(config)?;
        let external_container_reg = config
            .section("external_container_reg")
            .and_then(|section| section.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut vars = Map::new();
        vars.insert("name".into(), json!(config.project_name));
        vars.insert("environment".into(), json!(config.namespace));
        vars.insert("cloud-provider".into(), json!(config.provider.as_str()));
        if config.provider == ProviderKind::Aws {
            vars.insert("aws-region".into(), json!(config.amazon_web_services()?.region));
        }
        vars.insert("external_container_reg".into(), json!(external_container_reg));
        vars.insert("gpu_enabled".into(), json!(gpu_enabled));
        vars.insert("gpu_node_group_names".into(), json!(gpu_node_group_names));
        Ok(vars)
    }

    async fn check(&self, factory: &StageFactory, outputs: &StageOutputs, env: &ExecEnv) -> Result<()> {
        let kubeconfig = kubeconfig_path(outputs)?;
        let namespace = &factory.config.namespace;

        readiness_policy()
            .retry(&format!("namespace {}", namespace), |_| {
                let kubeconfig = &kubeconfig;
                async move {
                    let namespaces = self.kubectl.namespaces(kubeconfig, env).await?;
                    if namespaces.iter().any(|n| n == namespace) {
                        Ok(())
                    } else {
                        Err(NebariError::Stage(format!(
                            "namespace={} not provisioned within kubernetes cluster",
                            namespace
                        )))
                    }
                }
            })
            .await
            .map_err(|e| NebariError::check(KUBERNETES_INITIALIZE, e.to_string()))?;

        tracing::info!(stage = KUBERNETES_INITIALIZE, "kubernetes initialized successfully");
        Ok(())
    }
}
