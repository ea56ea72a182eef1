//! `05-kubernetes-keycloak`: the identity provider behind every service.

use super::{KUBERNETES_KEYCLOAK, cluster_objects, ingress_domain, node_selectors};
use crate::checks::readiness_policy;
use crate::keycloak::{KeycloakAdmin, KeycloakCredentials};
use crate::terraform::{TerraformStageBody, output_value};
use async_trait::async_trait;
use nebari_config::NebariConfig;
use nebari_core::{NebariError, Result, StageFactory, StageOutputs};
use nebari_tofu::{ExecEnv, Outputs};
use serde_json::{Map, Value, json};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Alphanumeric secret from the thread-local CSPRNG.
fn generated_secret(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub struct KubernetesKeycloak {
    root_password: String,
    bot_password: String,
}

impl KubernetesKeycloak {
    pub fn new(config: &NebariConfig) -> Self {
        let root_password = match &config.security.keycloak.initial_root_password {
            Some(password) => password.clone(),
            None => {
                tracing::warn!(
                    "security.keycloak.initial_root_password is not set, generated one for this run; \
                     set it in the configuration to keep access to the root account"
                );
                generated_secret(32)
            }
        };
        Self {
            root_password,
            bot_password: generated_secret(32),
        }
    }

    pub fn root_password(&self) -> &str {
        &self.root_password
    }
}

#[async_trait]
impl TerraformStageBody for KubernetesKeycloak {
    const NAME: &'static str = KUBERNETES_KEYCLOAK;
    const PRIORITY: i32 = 50;

    fn input_schema(&self) -> &'static [&'static str] {
        &["security.keycloak"]
    }

    fn output_schema(&self) -> &'static [&'static str] {
        &["keycloak_credentials", "keycloak_nebari_bot_password"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[super::KUBERNETES_INGRESS]
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        cluster_objects(KUBERNETES_KEYCLOAK, &factory.config)
    }

    fn input_vars(&self, factory: &StageFactory, outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let config = &factory.config;
        let general = node_selectors(outputs)?
            .get("general")
            .cloned()
            .unwrap_or(Value::Null);
        let overrides = serde_json::to_string(&config.security.keycloak.overrides)?;

        let mut vars = Map::new();
        vars.insert("name".into(), json!(config.project_name));
        vars.insert("environment".into(), json!(config.namespace));
        vars.insert("endpoint".into(), json!(ingress_domain(outputs)?));
        vars.insert("initial_root_password".into(), json!(self.root_password));
        vars.insert("overrides".into(), json!([overrides]));
        vars.insert("node_group".into(), general);
        vars.insert("themes".into(), json!({}));
        Ok(vars)
    }

    /// The bot password is only generated when the tool did not report one.
    fn set_outputs(&self, _factory: &StageFactory, _outputs: &StageOutputs, published: &mut Outputs) -> Result<()> {
        if !published.contains_key("keycloak_nebari_bot_password") {
            published.insert(
                "keycloak_nebari_bot_password".into(),
                output_value(json!(self.bot_password)),
            );
        }
        Ok(())
    }

    fn env_layer(&self, _factory: &StageFactory, outputs: &StageOutputs) -> Result<ExecEnv> {
        Ok(KeycloakCredentials::from_outputs(outputs, KUBERNETES_KEYCLOAK)?.env_layer())
    }

    async fn check(&self, _factory: &StageFactory, outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        let credentials = KeycloakCredentials::from_outputs(outputs, KUBERNETES_KEYCLOAK)?;
        readiness_policy()
            .retry(&format!("keycloak login at {}", credentials.url), |_| {
                KeycloakAdmin::login(&credentials)
            })
            .await
            .map_err(|e| {
                NebariError::check(
                    KUBERNETES_KEYCLOAK,
                    format!("unable to connect to keycloak master realm: {}", e),
                )
            })?;
        tracing::info!(stage = KUBERNETES_KEYCLOAK, "keycloak master realm reachable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{INFRASTRUCTURE, KUBERNETES_INGRESS};
    use crate::testing::{FakeEngine, config, factory, tool_outputs};

    fn upstream_outputs() -> StageOutputs {
        let mut outputs = StageOutputs::new();
        outputs
            .insert(
                INFRASTRUCTURE,
                tool_outputs(json!({"node_selectors": {
                    "general": {"key": "kubernetes.io/os", "value": "linux"},
                    "user": {"key": "kubernetes.io/os", "value": "linux"},
                }})),
            )
            .unwrap();
        outputs
            .insert(KUBERNETES_INGRESS, tool_outputs(json!({"domain": "demo.example.com"})))
            .unwrap();
        outputs
    }

    #[test]
    fn test_input_vars_use_configured_password() {
        let out = tempfile::tempdir().unwrap();
        let config = config(
            "project_name: demo\nprovider: local\nsecurity:\n  keycloak:\n    initial_root_password: s3cret\n    overrides:\n      image:\n        tag: '15.0'\n",
        );
        let stage = KubernetesKeycloak::new(&config);
        let factory = factory(config, out.path(), FakeEngine::new());

        let vars = stage.input_vars(&factory, &upstream_outputs()).unwrap();
        assert_eq!(vars["initial_root_password"], "s3cret");
        assert_eq!(vars["endpoint"], "demo.example.com");
        assert_eq!(vars["overrides"], json!([r#"{"image":{"tag":"15.0"}}"#]));
        assert_eq!(vars["node_group"], json!({"key": "kubernetes.io/os", "value": "linux"}));
        assert_eq!(vars["themes"], json!({}));
    }

    #[test]
    fn test_missing_password_is_generated_once() {
        let config = config("project_name: demo\nprovider: local\n");
        let stage = KubernetesKeycloak::new(&config);
        assert_eq!(stage.root_password().len(), 32);
        assert!(stage.root_password().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(stage.root_password(), stage.bot_password);
    }

    #[tokio::test]
    async fn test_deploy_publishes_bot_password_and_keycloak_env() {
        let out = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new().with_outputs(
            KUBERNETES_KEYCLOAK,
            json!({"keycloak_credentials": {
                "url": "https://demo.example.com",
                "username": "root",
                "password": "s3cret",
                "realm": "master",
                "client_id": "admin-cli",
            }}),
        );
        let config = config("project_name: demo\nprovider: local\n");
        let stage = crate::terraform::TerraformStage::new(
            &factory(config.clone(), out.path(), engine.clone()),
            KubernetesKeycloak::new(&config),
        );

        let mut outputs = upstream_outputs();
        let scope = nebari_core::Stage::deploy(&stage, &mut outputs, &ExecEnv::new())
            .await
            .unwrap();

        assert_eq!(scope.env().get("KEYCLOAK_USER"), Some("root"));
        assert_eq!(scope.env().get("KEYCLOAK_URL"), Some("https://demo.example.com"));
        assert_eq!(
            outputs
                .str_value(KUBERNETES_KEYCLOAK, "keycloak_nebari_bot_password")
                .unwrap()
                .len(),
            32
        );
    }
}
