//! Typed configuration tree for `nebari-config.yaml`.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Free-form keys preserved verbatim.
pub type Extra = BTreeMap<String, Value>;

/// Where the cluster lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Existing,
    Do,
    Aws,
    Gcp,
    Azure,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Existing => "existing",
            ProviderKind::Do => "do",
            ProviderKind::Aws => "aws",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Azure => "azure",
        }
    }

    /// Name of the provider-specific configuration block.
    pub fn section_name(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Existing => "existing",
            ProviderKind::Do => "digital_ocean",
            ProviderKind::Aws => "amazon_web_services",
            ProviderKind::Gcp => "google_cloud_platform",
            ProviderKind::Azure => "azure",
        }
    }

    pub fn is_cloud(&self) -> bool {
        !matches!(self, ProviderKind::Local | ProviderKind::Existing)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerraformStateKind {
    #[default]
    Remote,
    Local,
    Existing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerraformState {
    #[serde(rename = "type", default)]
    pub kind: TerraformStateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateKind {
    #[default]
    SelfSigned,
    LetsEncrypt,
    Existing,
    Disabled,
}

impl CertificateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateKind::SelfSigned => "self-signed",
            CertificateKind::LetsEncrypt => "lets-encrypt",
            CertificateKind::Existing => "existing",
            CertificateKind::Disabled => "disabled",
        }
    }
}

fn default_acme_server() -> String {
    "https://acme-v02.api.letsencrypt.org/directory".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(rename = "type", default)]
    pub kind: CertificateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme_email: Option<String>,
    #[serde(default = "default_acme_server")]
    pub acme_server: String,
}

impl Default for Certificate {
    fn default() -> Self {
        Self {
            kind: CertificateKind::default(),
            secret_name: None,
            acme_email: None,
            acme_server: default_acme_server(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingress {
    #[serde(default)]
    pub terraform_overrides: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub auto_provision: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CiKind {
    GithubActions,
    GitlabCi,
    #[default]
    None,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiCd {
    #[serde(rename = "type", default)]
    pub kind: CiKind,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_true")]
    pub commit_render: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_script: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_script: Vec<Value>,
}

impl Default for CiCd {
    fn default() -> Self {
        Self {
            kind: CiKind::default(),
            branch: default_branch(),
            commit_render: true,
            before_script: Vec::new(),
            after_script: Vec::new(),
        }
    }
}

fn default_realm_display_name() -> String {
    "Nebari".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keycloak {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_root_password: Option<String>,
    #[serde(default)]
    pub overrides: serde_json::Map<String, Value>,
    #[serde(default = "default_realm_display_name")]
    pub realm_display_name: String,
}

impl Default for Keycloak {
    fn default() -> Self {
        Self {
            initial_root_password: None,
            overrides: serde_json::Map::new(),
            realm_display_name: default_realm_display_name(),
        }
    }
}

fn default_authentication() -> Value {
    serde_json::json!({ "type": "password" })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default = "default_authentication")]
    pub authentication: Value,
    #[serde(default = "default_true")]
    pub shared_users_group: bool,
    #[serde(default)]
    pub keycloak: Keycloak,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            authentication: default_authentication(),
            shared_users_group: true,
            keycloak: Keycloak::default(),
        }
    }
}

/// A node label selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

fn default_node_selectors() -> BTreeMap<String, KeyValue> {
    ["general", "user", "worker"]
        .into_iter()
        .map(|group| {
            (
                group.to_string(),
                KeyValue::new("kubernetes.io/os", "linux"),
            )
        })
        .collect()
}

/// Settings shared by the `local` and `existing` providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    #[serde(default = "default_node_selectors")]
    pub node_selectors: BTreeMap<String, KeyValue>,
}

impl Default for KubernetesTarget {
    fn default() -> Self {
        Self {
            kube_context: None,
            node_selectors: default_node_selectors(),
        }
    }
}

fn default_max_nodes() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub instance: String,
    #[serde(default)]
    pub min_nodes: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default)]
    pub gpu: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalOceanProvider {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsProvider {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpProvider {
    pub project: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureProvider {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub storage_account_postfix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// An extra service deployed next to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfExtension {
    pub name: String,
    #[serde(default)]
    pub urlslug: String,
    #[serde(default)]
    pub logout: String,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_namespace() -> String {
    "dev".to_string()
}

fn default_nebari_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// The whole `nebari-config.yaml` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NebariConfig {
    pub project_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default = "default_nebari_version")]
    pub nebari_version: String,
    #[serde(default)]
    pub prevent_deploy: bool,
    #[serde(default)]
    pub terraform_state: TerraformState,
    #[serde(default)]
    pub certificate: Certificate,
    #[serde(default)]
    pub ingress: Ingress,
    #[serde(default)]
    pub dns: Dns,
    #[serde(default)]
    pub ci_cd: CiCd,
    #[serde(default)]
    pub security: Security,
    #[serde(default)]
    pub local: KubernetesTarget,
    #[serde(default)]
    pub existing: KubernetesTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_ocean: Option<DigitalOceanProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_web_services: Option<AwsProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_platform: Option<GcpProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureProvider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tf_extensions: Vec<TfExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helm_extensions: Vec<Value>,
    /// Sections consumed only by stage modules (jupyterhub, monitoring, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

impl NebariConfig {
    /// `{project_name}-{namespace}`, the prefix of most cloud resource names.
    pub fn resource_prefix(&self) -> String {
        format!("{}-{}", self.project_name, self.namespace)
    }

    pub fn digital_ocean(&self) -> Result<&DigitalOceanProvider> {
        self.digital_ocean
            .as_ref()
            .ok_or_else(|| missing_section(ProviderKind::Do))
    }

    pub fn amazon_web_services(&self) -> Result<&AwsProvider> {
        self.amazon_web_services
            .as_ref()
            .ok_or_else(|| missing_section(ProviderKind::Aws))
    }

    pub fn google_cloud_platform(&self) -> Result<&GcpProvider> {
        self.google_cloud_platform
            .as_ref()
            .ok_or_else(|| missing_section(ProviderKind::Gcp))
    }

    pub fn azure(&self) -> Result<&AzureProvider> {
        self.azure
            .as_ref()
            .ok_or_else(|| missing_section(ProviderKind::Azure))
    }

    /// The `local` or `existing` block, whichever the provider uses.
    pub fn kubernetes_target(&self) -> Option<&KubernetesTarget> {
        match self.provider {
            ProviderKind::Local => Some(&self.local),
            ProviderKind::Existing => Some(&self.existing),
            _ => None,
        }
    }

    /// Looks up a pass-through section such as `jupyterhub` or `monitoring`.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        validate_project_name(&self.project_name)?;

        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }

        let section_present = match self.provider {
            ProviderKind::Local | ProviderKind::Existing => true,
            ProviderKind::Do => self.digital_ocean.is_some(),
            ProviderKind::Aws => self.amazon_web_services.is_some(),
            ProviderKind::Gcp => self.google_cloud_platform.is_some(),
            ProviderKind::Azure => self.azure.is_some(),
        };
        if !section_present {
            return Err(missing_section(self.provider));
        }

        if self.terraform_state.kind == TerraformStateKind::Existing
            && self.terraform_state.backend.is_none()
        {
            return Err(ConfigError::Invalid(
                "terraform_state.type=existing requires terraform_state.backend".into(),
            ));
        }

        match self.certificate.kind {
            CertificateKind::LetsEncrypt if self.certificate.acme_email.is_none() => {
                return Err(ConfigError::Invalid(
                    "certificate.type=lets-encrypt requires certificate.acme_email".into(),
                ));
            }
            CertificateKind::Existing if self.certificate.secret_name.is_none() => {
                return Err(ConfigError::Invalid(
                    "certificate.type=existing requires certificate.secret_name".into(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

fn missing_section(provider: ProviderKind) -> ConfigError {
    ConfigError::Invalid(format!(
        "provider={} requires a `{}` section",
        provider,
        provider.section_name()
    ))
}

fn validate_project_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if starts_with_letter && rest_ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "project_name '{}' must start with a letter and contain only letters, digits, '-' or '_'",
            name
        )))
    }
}
