//! `01-terraform-state`: the bucket/table/storage account holding every later stage's state.
//!
//! Its own state is always local, so the stage re-imports the remote
//! resources on each run to stay idempotent.

use super::TERRAFORM_STATE;
use crate::credentials::require_var;
use crate::terraform::TerraformStageBody;
use crate::tf_objects::{
    AZURE_STATE_RESOURCE_GROUP_SUFFIX, azure_resource_group_name, azure_storage_account_name,
    cloud_provider,
};
use async_trait::async_trait;
use nebari_config::ProviderKind;
use nebari_core::{Result, StageFactory, StageOutputs};
use nebari_tofu::{ExecEnv, StateImport};
use serde_json::{Map, Value, json};

pub struct TerraformState;

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl TerraformStageBody for TerraformState {
    const NAME: &'static str = TERRAFORM_STATE;
    const PRIORITY: i32 = 10;

    fn input_schema(&self) -> &'static [&'static str] {
        &["terraform_state", "provider"]
    }

    fn per_provider(&self) -> bool {
        true
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        Ok(cloud_provider(&factory.config)?.into_iter().collect())
    }

    fn input_vars(&self, factory: &StageFactory, _outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let config = &factory.config;
        let vars = match config.provider {
            ProviderKind::Do => json!({
                "name": config.project_name,
                "namespace": config.namespace,
                "region": config.digital_ocean()?.region,
            }),
            ProviderKind::Gcp => json!({
                "name": config.project_name,
                "namespace": config.namespace,
                "region": config.google_cloud_platform()?.region,
            }),
            ProviderKind::Aws => json!({
                "name": config.project_name,
                "namespace": config.namespace,
            }),
            ProviderKind::Azure => {
                let azure = config.azure()?;
                json!({
                    "name": config.project_name,
                    "namespace": config.namespace,
                    "region": azure.region,
                    "storage_account_name": azure_storage_account_name(config)?,
                    "storage_container_name": format!("{}-state", config.resource_prefix()),
                    "state_resource_group_name": azure_resource_group_name(config, AZURE_STATE_RESOURCE_GROUP_SUFFIX)?,
                    "tags": azure.tags,
                })
            }
            ProviderKind::Local | ProviderKind::Existing => json!({}),
        };
        Ok(object(vars))
    }

    fn state_imports(&self, factory: &StageFactory) -> Result<Vec<StateImport>> {
        let config = &factory.config;
        let prefix = config.resource_prefix();
        let bucket = format!("{}-terraform-state", prefix);

        Ok(match config.provider {
            ProviderKind::Do => vec![StateImport::new(
                "module.terraform-state.module.spaces.digitalocean_spaces_bucket.main",
                format!("{},{}", config.digital_ocean()?.region, bucket),
            )],
            ProviderKind::Gcp => vec![StateImport::new(
                "module.terraform-state.module.gcs.google_storage_bucket.static-site",
                bucket,
            )],
            ProviderKind::Aws => vec![
                StateImport::new("module.terraform-state.aws_s3_bucket.terraform-state", bucket.clone()),
                StateImport::new(
                    "module.terraform-state.aws_dynamodb_table.terraform-state-lock",
                    format!("{}-lock", bucket),
                ),
            ],
            ProviderKind::Azure => {
                let subscription_id = require_var(config, "ARM_SUBSCRIPTION_ID")?;
                let resource_group = format!(
                    "/subscriptions/{}/resourceGroups/{}",
                    subscription_id,
                    azure_resource_group_name(config, AZURE_STATE_RESOURCE_GROUP_SUFFIX)?
                );
                let account = azure_storage_account_name(config)?;
                vec![
                    StateImport::new(
                        "module.terraform-state.azurerm_resource_group.terraform-state-resource-group",
                        resource_group.clone(),
                    ),
                    StateImport::new(
                        "module.terraform-state.azurerm_storage_account.terraform-state-storage-account",
                        format!(
                            "{}/providers/Microsoft.Storage/storageAccounts/{}",
                            resource_group, account
                        ),
                    ),
                    StateImport::new(
                        "module.terraform-state.azurerm_storage_container.storage_container",
                        format!("https://{}.blob.core.windows.net/{}-state", account, prefix),
                    ),
                ]
            }
            ProviderKind::Local | ProviderKind::Existing => Vec::new(),
        })
    }

    /// Spaces is driven through the s3 api, which reads the aws key names.
    fn env_layer(&self, factory: &StageFactory, _outputs: &StageOutputs) -> Result<ExecEnv> {
        let config = &factory.config;
        if config.provider != ProviderKind::Do {
            return Ok(ExecEnv::new());
        }
        Ok(ExecEnv::new()
            .with("AWS_ACCESS_KEY_ID", require_var(config, "SPACES_ACCESS_KEY_ID")?)
            .with("AWS_SECRET_ACCESS_KEY", require_var(config, "SPACES_SECRET_ACCESS_KEY")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::TerraformStage;
    use crate::testing::{FakeEngine, config, factory};
    use nebari_core::{FileContent, Stage};
    use serial_test::serial;

    #[tokio::test]
    async fn test_aws_imports_bucket_and_lock_table() {
        let out = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let stage = TerraformStage::new(
            &factory(
                config("project_name: demo\nprovider: aws\namazon_web_services:\n  region: us-east-1\n"),
                out.path(),
                engine.clone(),
            ),
            TerraformState,
        );
        assert_eq!(stage.stage_prefix(), "stages/01-terraform-state/aws");

        let mut outputs = StageOutputs::new();
        stage.deploy(&mut outputs, &ExecEnv::new()).await.unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                "init:01-terraform-state",
                "import:01-terraform-state:module.terraform-state.aws_s3_bucket.terraform-state",
                "import:01-terraform-state:module.terraform-state.aws_dynamodb_table.terraform-state-lock",
                "apply:01-terraform-state",
            ]
        );
        assert_eq!(engine.vars("01-terraform-state"), json!({"name": "demo", "namespace": "dev"}));
    }

    #[test]
    fn test_state_stage_has_no_backend() {
        let out = tempfile::tempdir().unwrap();
        let stage = TerraformStage::new(
            &factory(
                config("project_name: demo\nprovider: gcp\ngoogle_cloud_platform:\n  project: proj\n  region: us-central1\n"),
                out.path(),
                FakeEngine::new(),
            ),
            TerraformState,
        );
        let files = stage.render().unwrap();
        let FileContent::Text(text) = &files["stages/01-terraform-state/gcp/_nebari.tf.json"] else {
            panic!("expected text");
        };
        let rendered: Value = serde_json::from_str(text).unwrap();
        assert_eq!(rendered["provider"]["google"]["project"], "proj");
        assert!(rendered.get("terraform").is_none());
    }

    #[test]
    #[serial]
    fn test_digital_ocean_env_layer_maps_spaces_keys() {
        let out = tempfile::tempdir().unwrap();
        let factory = factory(
            config("project_name: demo\nprovider: do\ndigital_ocean:\n  region: nyc3\n"),
            out.path(),
            FakeEngine::new(),
        );
        let env = temp_env::with_vars(
            [("SPACES_ACCESS_KEY_ID", Some("key")), ("SPACES_SECRET_ACCESS_KEY", Some("secret"))],
            || TerraformState.env_layer(&factory, &StageOutputs::new()),
        )
        .unwrap();
        assert_eq!(env.get("AWS_ACCESS_KEY_ID"), Some("key"));
        assert_eq!(env.get("AWS_SECRET_ACCESS_KEY"), Some("secret"));

        let imports = TerraformState.state_imports(&factory).unwrap();
        assert_eq!(imports[0].id, "nyc3,demo-dev-terraform-state");
    }

    #[test]
    #[serial]
    fn test_azure_imports_need_subscription() {
        let out = tempfile::tempdir().unwrap();
        let factory = factory(
            config("project_name: demo\nprovider: azure\nazure:\n  region: eastus\n  storage_account_postfix: x1\n"),
            out.path(),
            FakeEngine::new(),
        );

        let missing = temp_env::with_var_unset("ARM_SUBSCRIPTION_ID", || TerraformState.state_imports(&factory));
        assert!(missing.is_err());

        let imports = temp_env::with_var("ARM_SUBSCRIPTION_ID", Some("sub"), || {
            TerraformState.state_imports(&factory)
        })
        .unwrap();
        assert_eq!(imports[0].id, "/subscriptions/sub/resourceGroups/demo-dev-state");
        assert_eq!(
            imports[2].id,
            "https://demodevx1.blob.core.windows.net/demo-dev-state"
        );
    }
}
