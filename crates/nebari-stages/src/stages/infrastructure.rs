//! `02-infrastructure`: the Kubernetes cluster itself.
//!
//! Publishes `kubernetes_credentials` and `kubeconfig_filename` from the
//! apply, plus the computed `node_selectors` every later stage schedules on.

use super::{INFRASTRUCTURE, kubeconfig_path};
use crate::checks::readiness_policy;
use crate::credentials::require_var;
use crate::kubectl::Kubectl;
use crate::terraform::{TerraformStageBody, output_value};
use crate::tf_objects::{
    AZURE_NODE_RESOURCE_GROUP_SUFFIX, azure_resource_group_name, cloud_provider, terraform_state,
};
use async_trait::async_trait;
use nebari_config::{Extra, KeyValue, NebariConfig, NodeGroup, ProviderKind};
use nebari_core::{NebariError, Result, StageFactory, StageOutputs};
use nebari_tofu::{ExecEnv, Outputs, StateImport};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `kubernetes_credentials` key → variable read by the kubernetes and helm providers.
const CREDENTIAL_VARIABLES: &[(&str, &str)] = &[
    ("config_path", "KUBE_CONFIG_PATH"),
    ("config_context", "KUBE_CTX"),
    ("username", "KUBE_USER"),
    ("password", "KUBE_PASSWORD"),
    ("client_certificate", "KUBE_CLIENT_CERT_DATA"),
    ("client_key", "KUBE_CLIENT_KEY_DATA"),
    ("cluster_ca_certificate", "KUBE_CLUSTER_CA_CERT_DATA"),
    ("host", "KUBE_HOST"),
    ("token", "KUBE_TOKEN"),
];

const NODE_GROUPS: [&str; 3] = ["general", "user", "worker"];

/// Where the cluster kubeconfig is written.
pub fn kubeconfig_filename() -> PathBuf {
    std::env::temp_dir().join("NEBARI_KUBECONFIG")
}

/// Label selectors for the general/user/worker node groups.
pub fn node_selectors(config: &NebariConfig) -> BTreeMap<String, KeyValue> {
    let label = match config.provider {
        ProviderKind::Aws => "eks.amazonaws.com/nodegroup",
        ProviderKind::Gcp => "cloud.google.com/gke-nodepool",
        ProviderKind::Azure => "azure-node-pool",
        ProviderKind::Do => "doks.digitalocean.com/node-pool",
        ProviderKind::Local | ProviderKind::Existing => {
            return config
                .kubernetes_target()
                .map(|target| target.node_selectors.clone())
                .unwrap_or_default();
        }
    };
    NODE_GROUPS
        .iter()
        .map(|group| (group.to_string(), KeyValue::new(label, *group)))
        .collect()
}

fn extra_or(extra: &Extra, key: &str, default: Value) -> Value {
    extra.get(key).cloned().unwrap_or(default)
}

fn insert_extra(vars: &mut Map<String, Value>, extra: &Extra) {
    for (key, value) in extra {
        vars.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn sized_groups(groups: &BTreeMap<String, NodeGroup>) -> Value {
    groups
        .iter()
        .map(|(name, group)| {
            (
                name.clone(),
                json!({
                    "instance": group.instance,
                    "min_nodes": group.min_nodes,
                    "max_nodes": group.max_nodes,
                }),
            )
        })
        .collect::<Map<String, Value>>()
        .into()
}

fn cluster_vars(config: &NebariConfig) -> Result<Map<String, Value>> {
    let kubeconfig = kubeconfig_filename().to_string_lossy().into_owned();
    let mut vars = Map::new();

    match config.provider {
        ProviderKind::Local => {
            vars.insert("kubeconfig_filename".into(), json!(kubeconfig));
            vars.insert("kube_context".into(), json!(config.local.kube_context));
        }
        ProviderKind::Existing => {
            vars.insert("kube_context".into(), json!(config.existing.kube_context));
        }
        ProviderKind::Do => {
            let digital_ocean = config.digital_ocean()?;
            vars.extend(object(json!({
                "name": config.project_name,
                "environment": config.namespace,
                "region": digital_ocean.region,
                "tags": digital_ocean.tags,
                "kubernetes_version": digital_ocean.kubernetes_version,
                "node_groups": sized_groups(&digital_ocean.node_groups),
                "kubeconfig_filename": kubeconfig,
            })));
        }
        ProviderKind::Gcp => {
            let gcp = config.google_cloud_platform()?;
            let node_groups: Vec<Value> = gcp
                .node_groups
                .iter()
                .map(|(name, group)| {
                    json!({
                        "name": name,
                        "instance_type": group.instance,
                        "min_size": group.min_nodes,
                        "max_size": group.max_nodes,
                        "labels": extra_or(&group.extra, "labels", json!({})),
                        "preemptible": extra_or(&group.extra, "preemptible", json!(false)),
                        "guest_accelerators": extra_or(&group.extra, "guest_accelerators", json!([])),
                    })
                })
                .collect();
            vars.extend(object(json!({
                "name": config.project_name,
                "environment": config.namespace,
                "region": gcp.region,
                "project_id": gcp.project,
                "availability_zones": gcp.availability_zones,
                "node_groups": node_groups,
                "kubeconfig_filename": kubeconfig,
                "tags": gcp.tags,
                "kubernetes_version": gcp.kubernetes_version,
            })));
            insert_extra(&mut vars, &gcp.extra);
        }
        ProviderKind::Azure => {
            let azure = config.azure()?;
            vars.extend(object(json!({
                "name": config.project_name,
                "environment": config.namespace,
                "region": azure.region,
                "kubeconfig_filename": kubeconfig,
                "kubernetes_version": azure.kubernetes_version,
                "node_groups": sized_groups(&azure.node_groups),
                "resource_group_name": azure_resource_group_name(config, "")?,
                "node_resource_group_name": azure_resource_group_name(config, AZURE_NODE_RESOURCE_GROUP_SUFFIX)?,
                "tags": azure.tags,
            })));
            insert_extra(&mut vars, &azure.extra);
        }
        ProviderKind::Aws => {
            let aws = config.amazon_web_services()?;
            let node_groups: Vec<Value> = aws
                .node_groups
                .iter()
                .map(|(name, group)| {
                    json!({
                        "name": name,
                        "instance_type": group.instance,
                        "gpu": group.gpu,
                        "min_size": group.min_nodes,
                        "desired_size": group.min_nodes,
                        "max_size": group.max_nodes,
                        "single_subnet": extra_or(&group.extra, "single_subnet", json!(false)),
                        "permissions_boundary": extra_or(&group.extra, "permissions_boundary", Value::Null),
                    })
                })
                .collect();
            vars.extend(object(json!({
                "name": config.project_name,
                "environment": config.namespace,
                "region": aws.region,
                "kubernetes_version": aws.kubernetes_version,
                "node_groups": node_groups,
                "availability_zones": aws.availability_zones,
                "kubeconfig_filename": kubeconfig,
                "tags": aws.tags,
            })));
            insert_extra(&mut vars, &aws.extra);
        }
    }

    Ok(vars)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Maps `kubernetes_credentials` onto `KUBE_*` variables, skipping nulls.
pub fn kubernetes_env(credentials: &Map<String, Value>) -> ExecEnv {
    let mut env = ExecEnv::new();
    for (key, variable) in CREDENTIAL_VARIABLES {
        match credentials.get(*key) {
            Some(Value::String(value)) => env.set(*variable, value.as_str()),
            Some(Value::Null) | None => {}
            Some(other) => env.set(*variable, other.to_string()),
        }
    }
    env
}

pub struct Infrastructure {
    kubectl: Kubectl,
}

impl Infrastructure {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl TerraformStageBody for Infrastructure {
    const NAME: &'static str = INFRASTRUCTURE;
    const PRIORITY: i32 = 20;

    fn input_schema(&self) -> &'static [&'static str] {
        &[
            "provider",
            "local",
            "existing",
            "digital_ocean",
            "amazon_web_services",
            "google_cloud_platform",
            "azure",
        ]
    }

    fn output_schema(&self) -> &'static [&'static str] {
        &["kubernetes_credentials", "kubeconfig_filename", "node_selectors"]
    }

    fn per_provider(&self) -> bool {
        true
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        let config = &factory.config;
        if !config.provider.is_cloud() {
            return Ok(Vec::new());
        }
        let mut objects: Vec<Value> = cloud_provider(config)?.into_iter().collect();
        objects.extend(terraform_state(INFRASTRUCTURE, config)?);
        Ok(objects)
    }

    fn input_vars(&self, factory: &StageFactory, _outputs: &StageOutputs) -> Result<Map<String, Value>> {
        cluster_vars(&factory.config)
    }

    fn state_imports(&self, factory: &StageFactory) -> Result<Vec<StateImport>> {
        let config = &factory.config;
        if config.provider != ProviderKind::Azure || config.azure()?.resource_group_name.is_none() {
            return Ok(Vec::new());
        }
        let subscription_id = require_var(config, "ARM_SUBSCRIPTION_ID")?;
        Ok(vec![StateImport::new(
            "azurerm_resource_group.resource_group",
            format!(
                "/subscriptions/{}/resourceGroups/{}",
                subscription_id,
                azure_resource_group_name(config, "")?
            ),
        )])
    }

    fn set_outputs(&self, factory: &StageFactory, _outputs: &StageOutputs, published: &mut Outputs) -> Result<()> {
        let selectors = serde_json::to_value(node_selectors(&factory.config))?;
        published.insert("node_selectors".into(), output_value(selectors));
        Ok(())
    }

    fn env_layer(&self, _factory: &StageFactory, outputs: &StageOutputs) -> Result<ExecEnv> {
        match outputs.value(INFRASTRUCTURE, "kubernetes_credentials")? {
            Value::Object(credentials) => Ok(kubernetes_env(credentials)),
            other => Err(NebariError::Stage(format!(
                "kubernetes_credentials must be an object, got {}",
                other
            ))),
        }
    }

    async fn check(&self, _factory: &StageFactory, outputs: &StageOutputs, env: &ExecEnv) -> Result<()> {
        let kubeconfig = kubeconfig_path(outputs)?;
        let namespaces = readiness_policy()
            .retry("list cluster namespaces", |_| self.kubectl.namespaces(&kubeconfig, env))
            .await
            .map_err(|e| NebariError::check(INFRASTRUCTURE, format!("unable to connect to kubernetes cluster: {}", e)))?;

        if namespaces.is_empty() {
            return Err(NebariError::check(
                INFRASTRUCTURE,
                "no namespaces found within kubernetes cluster",
            ));
        }
        tracing::info!(stage = INFRASTRUCTURE, "kubernetes cluster successfully provisioned");
        Ok(())
    }
}
