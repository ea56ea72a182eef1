//! `08-nebari-tf-extensions`: user supplied services and helm charts.

use super::{KUBERNETES_KEYCLOAK, KUBERNETES_SERVICES, TF_EXTENSIONS, cluster_objects, realm_id};
use crate::terraform::TerraformStageBody;
use async_trait::async_trait;
use nebari_core::{Result, StageFactory, StageOutputs};
use serde_json::{Map, Value, json};

pub struct TfExtensions;

#[async_trait]
impl TerraformStageBody for TfExtensions {
    const NAME: &'static str = TF_EXTENSIONS;
    const PRIORITY: i32 = 80;

    fn input_schema(&self) -> &'static [&'static str] {
        &["tf_extensions", "helm_extensions"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[KUBERNETES_SERVICES]
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        cluster_objects(TF_EXTENSIONS, &factory.config)
    }

    fn input_vars(&self, factory: &StageFactory, outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let config = &factory.config;
        let mut vars = Map::new();
        vars.insert("environment".into(), json!(config.namespace));
        vars.insert("endpoint".into(), json!(config.domain));
        vars.insert("realm_id".into(), json!(realm_id(outputs)?));
        vars.insert("tf_extensions".into(), serde_json::to_value(&config.tf_extensions)?);
        vars.insert("nebari_config_yaml".into(), config.to_json()?);
        vars.insert(
            "keycloak_nebari_bot_password".into(),
            outputs.value(KUBERNETES_KEYCLOAK, "keycloak_nebari_bot_password")?.clone(),
        );
        vars.insert("helm_extensions".into(), json!(config.helm_extensions));
        Ok(vars)
    }
}
