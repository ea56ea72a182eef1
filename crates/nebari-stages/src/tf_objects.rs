//! Provider and backend blocks shared by the terraform-backed stages.

use nebari_config::{NebariConfig, ProviderKind, TerraformStateKind};
use nebari_core::Result;
use nebari_tofu::objects::{backend, data, provider};
use nebari_tofu::merge_all;
use serde_json::{Map, Value, json};

/// Suffix of the Azure resource group holding the state storage account.
pub const AZURE_STATE_RESOURCE_GROUP_SUFFIX: &str = "-state";
pub const AZURE_NODE_RESOURCE_GROUP_SUFFIX: &str = "-node-resource-group";

pub fn aws_provider(config: &NebariConfig) -> Result<Value> {
    let aws = config.amazon_web_services()?;
    Ok(provider("aws", json!({"region": aws.region})))
}

pub fn google_provider(config: &NebariConfig) -> Result<Value> {
    let gcp = config.google_cloud_platform()?;
    Ok(provider(
        "google",
        json!({"project": gcp.project, "region": gcp.region}),
    ))
}

/// The cloud provider block the state and infrastructure stages apply with.
/// Only aws and gcp need one; the others are configured from the environment.
pub fn cloud_provider(config: &NebariConfig) -> Result<Option<Value>> {
    match config.provider {
        ProviderKind::Aws => aws_provider(config).map(Some),
        ProviderKind::Gcp => google_provider(config).map(Some),
        _ => Ok(None),
    }
}

/// EKS data sources every kubernetes-facing provider reads its endpoint from.
fn eks_cluster_data(config: &NebariConfig) -> Value {
    let cluster_name = config.resource_prefix();
    merge_all([
        data("aws_eks_cluster", "default", json!({"name": cluster_name})),
        data("aws_eks_cluster_auth", "default", json!({"name": cluster_name})),
    ])
}

fn eks_connection() -> Value {
    json!({
        "host": "${data.aws_eks_cluster.default.endpoint}",
        "cluster_ca_certificate": "${base64decode(data.aws_eks_cluster.default.certificate_authority[0].data)}",
        "token": "${data.aws_eks_cluster_auth.default.token}",
    })
}

pub fn kubernetes_provider(config: &NebariConfig) -> Result<Value> {
    let mut body = json!({"experiments": {"manifest_resource": true}});
    if config.provider != ProviderKind::Aws {
        return Ok(provider("kubernetes", body));
    }

    if let (Value::Object(target), Value::Object(connection)) = (&mut body, eks_connection()) {
        target.extend(connection);
    }
    Ok(merge_all([
        eks_cluster_data(config),
        aws_provider(config)?,
        provider("kubernetes", body),
    ]))
}

pub fn helm_provider(config: &NebariConfig) -> Value {
    if config.provider != ProviderKind::Aws {
        return provider("helm", json!({}));
    }
    merge_all([
        eks_cluster_data(config),
        provider("helm", json!({"kubernetes": eks_connection()})),
    ])
}

/// Azure storage account names are lowercase alphanumerics only.
pub fn azure_storage_account_name(config: &NebariConfig) -> Result<String> {
    let azure = config.azure()?;
    Ok(format!(
        "{}{}{}",
        config.project_name, config.namespace, azure.storage_account_postfix
    )
    .chars()
    .filter(char::is_ascii_alphanumeric)
    .collect::<String>()
    .to_lowercase())
}

/// `<base><suffix>` when a base resource group is configured, else `<project>-<namespace><suffix>`.
pub fn azure_resource_group_name(config: &NebariConfig, suffix: &str) -> Result<String> {
    let azure = config.azure()?;
    Ok(match azure.resource_group_name.as_deref() {
        Some(base) if !base.is_empty() => format!("{}{}", base, suffix),
        _ => format!("{}{}", config.resource_prefix(), suffix),
    })
}

/// Remote state backend block for the stage stored under `directory`.
///
/// Returns `None` for local state.
pub fn terraform_state(directory: &str, config: &NebariConfig) -> Result<Option<Value>> {
    let state = &config.terraform_state;
    let prefix = config.resource_prefix();

    let block = match state.kind {
        TerraformStateKind::Local => return Ok(None),
        TerraformStateKind::Existing => {
            let name = state.backend.as_deref().ok_or_else(|| {
                nebari_config::ConfigError::Invalid(
                    "terraform_state.type=existing requires terraform_state.backend".into(),
                )
            })?;
            let body: Map<String, Value> = state
                .config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            backend(name, Value::Object(body))
        }
        TerraformStateKind::Remote => match config.provider {
            ProviderKind::Aws => backend(
                "s3",
                json!({
                    "bucket": format!("{}-terraform-state", prefix),
                    "key": format!("terraform/{}/{}.tfstate", prefix, directory),
                    "region": config.amazon_web_services()?.region,
                    "encrypt": true,
                    "dynamodb_table": format!("{}-terraform-state-lock", prefix),
                }),
            ),
            ProviderKind::Gcp => backend(
                "gcs",
                json!({
                    "bucket": format!("{}-terraform-state", prefix),
                    "prefix": format!("terraform/{}/{}", config.project_name, directory),
                }),
            ),
            ProviderKind::Do => backend(
                "s3",
                json!({
                    "endpoint": format!("{}.digitaloceanspaces.com", config.digital_ocean()?.region),
                    // the s3 backend insists on an aws region
                    "region": "us-west-1",
                    "bucket": format!("{}-terraform-state", prefix),
                    "key": format!("terraform/{}/{}.tfstate", prefix, directory),
                    "skip_credentials_validation": true,
                    "skip_metadata_api_check": true,
                }),
            ),
            ProviderKind::Azure => backend(
                "azurerm",
                json!({
                    "resource_group_name": azure_resource_group_name(config, AZURE_STATE_RESOURCE_GROUP_SUFFIX)?,
                    "storage_account_name": azure_storage_account_name(config)?,
                    "container_name": format!("{}-state", prefix),
                    "key": format!("terraform/{}/{}", prefix, directory),
                }),
            ),
            ProviderKind::Local | ProviderKind::Existing => {
                let mut body = json!({
                    "secret_suffix": format!("{}-{}", prefix, directory),
                    "load_config_file": true,
                });
                if let Some(context) = config.kubernetes_target().and_then(|t| t.kube_context.as_ref())
                    && let Value::Object(map) = &mut body
                {
                    map.insert("config_context".into(), json!(context));
                }
                backend("kubernetes", body)
            }
        },
    };

    Ok(Some(block))
}
