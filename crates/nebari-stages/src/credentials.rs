//! Cloud credential preconditions.

use nebari_config::{NebariConfig, ProviderKind};
use nebari_core::{NebariError, Result};

/// Environment variables a provider needs before anything is applied.
pub fn required_variables(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::Aws => &["AWS_DEFAULT_REGION", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"],
        ProviderKind::Azure => &[
            "ARM_CLIENT_ID",
            "ARM_CLIENT_SECRET",
            "ARM_SUBSCRIPTION_ID",
            "ARM_TENANT_ID",
        ],
        ProviderKind::Do => &[
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
            "SPACES_ACCESS_KEY_ID",
            "SPACES_SECRET_ACCESS_KEY",
            "DIGITALOCEAN_TOKEN",
        ],
        ProviderKind::Gcp => &["GOOGLE_CREDENTIALS", "PROJECT_ID"],
        ProviderKind::Local | ProviderKind::Existing => &[],
    }
}

/// Checks credentials against `lookup`, usually `std::env::var`.
pub fn check_credentials_with<F>(config: &NebariConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<&str> = required_variables(config.provider)
        .iter()
        .copied()
        .filter(|name| lookup(name).is_none_or(|v| v.is_empty()))
        .collect();

    if !missing.is_empty() {
        return Err(NebariError::MissingCredentials {
            provider: config.provider.to_string(),
            missing: missing.join(", "),
        });
    }

    // DigitalOcean Spaces is reached through the s3 backend with the aws keys
    if config.provider == ProviderKind::Do && lookup("AWS_ACCESS_KEY_ID") != lookup("SPACES_ACCESS_KEY_ID") {
        return Err(NebariError::MissingCredentials {
            provider: config.provider.to_string(),
            missing: "AWS_ACCESS_KEY_ID must equal SPACES_ACCESS_KEY_ID".into(),
        });
    }

    Ok(())
}

pub fn check_cloud_credentials(config: &NebariConfig) -> Result<()> {
    check_credentials_with(config, |name| std::env::var(name).ok())
}

/// Reads one variable, reporting it as a missing credential.
pub(crate) fn require_var(config: &NebariConfig, name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| NebariError::MissingCredentials {
        provider: config.provider.to_string(),
        missing: name.to_string(),
    })
}
