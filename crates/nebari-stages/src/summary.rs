//! What a finished deployment reports back to the user.

use crate::keycloak::KeycloakCredentials;
use crate::stages::{INFRASTRUCTURE, KUBERNETES_INGRESS, KUBERNETES_KEYCLOAK, KUBERNETES_SERVICES};
use nebari_config::NebariConfig;
use nebari_core::StageOutputs;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCredentials {
    pub username: String,
    pub password: String,
    pub url: String,
    /// The password was generated for this run and is not in the configuration.
    pub generated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploySummary {
    /// `(service name, url)` in output order.
    pub service_urls: Vec<(String, String)>,
    pub kubeconfig: Option<String>,
    pub keycloak_root: Option<RootCredentials>,
}

impl DeploySummary {
    /// Collects the summary; stages that did not run are left out.
    pub fn from_outputs(config: &NebariConfig, outputs: &StageOutputs) -> Self {
        let service_urls = match outputs.value(KUBERNETES_SERVICES, "service_urls") {
            Ok(Value::Object(services)) => services
                .iter()
                .filter_map(|(name, service)| {
                    service
                        .get("url")
                        .and_then(Value::as_str)
                        .map(|url| (name.clone(), url.to_string()))
                })
                .collect(),
            _ => Vec::new(),
        };

        let kubeconfig = outputs
            .str_value(INFRASTRUCTURE, "kubeconfig_filename")
            .ok()
            .map(str::to_string);

        let configured = config.security.keycloak.initial_root_password.clone();
        let generated = configured.is_none();
        let password = configured.or_else(|| {
            KeycloakCredentials::from_outputs(outputs, KUBERNETES_KEYCLOAK)
                .ok()
                .map(|credentials| credentials.password)
        });
        let domain = outputs
            .str_value(KUBERNETES_INGRESS, "domain")
            .ok()
            .map(str::to_string)
            .or_else(|| config.domain.clone());
        let keycloak_root = match (password, domain) {
            (Some(password), Some(domain)) => Some(RootCredentials {
                username: "root".to_string(),
                password,
                url: format!("https://{}/auth/admin/", domain),
                generated,
            }),
            _ => None,
        };

        Self {
            service_urls,
            kubeconfig,
            keycloak_root,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service_urls.is_empty() && self.kubeconfig.is_none() && self.keycloak_root.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config, tool_outputs};
    use serde_json::json;

    #[test]
    fn test_full_summary() {
        let config = config(
            "project_name: demo\nprovider: local\ndomain: demo.example.com\nsecurity:\n  keycloak:\n    initial_root_password: pw\n",
        );
        let mut outputs = StageOutputs::new();
        outputs
            .insert(
                INFRASTRUCTURE,
                tool_outputs(json!({"kubeconfig_filename": "/tmp/NEBARI_KUBECONFIG"})),
            )
            .unwrap();
        outputs
            .insert(
                KUBERNETES_SERVICES,
                tool_outputs(json!({"service_urls": {
                    "jupyterhub": {"url": "https://demo.example.com/", "health_url": "https://demo.example.com/hub/api/"},
                    "dask_gateway": {"url": "https://demo.example.com/gateway/", "health_url": null},
                }})),
            )
            .unwrap();

        let summary = DeploySummary::from_outputs(&config, &outputs);
        assert_eq!(
            summary.service_urls,
            vec![
                ("dask_gateway".to_string(), "https://demo.example.com/gateway/".to_string()),
                ("jupyterhub".to_string(), "https://demo.example.com/".to_string()),
            ]
        );
        assert_eq!(summary.kubeconfig.as_deref(), Some("/tmp/NEBARI_KUBECONFIG"));
        let root = summary.keycloak_root.unwrap();
        assert_eq!(root.username, "root");
        assert_eq!(root.url, "https://demo.example.com/auth/admin/");
        assert!(!root.generated);
    }

    #[test]
    fn test_generated_password_and_ingress_domain() {
        let config = config("project_name: demo\nprovider: local\n");
        let mut outputs = StageOutputs::new();
        outputs
            .insert(KUBERNETES_INGRESS, tool_outputs(json!({"domain": "172.18.1.100"})))
            .unwrap();
        outputs
            .insert(
                KUBERNETES_KEYCLOAK,
                tool_outputs(json!({"keycloak_credentials": {
                    "url": "https://172.18.1.100",
                    "username": "root",
                    "password": "Xq9generated",
                    "realm": "master",
                    "client_id": "admin-cli",
                }})),
            )
            .unwrap();

        let root = DeploySummary::from_outputs(&config, &outputs).keycloak_root.unwrap();
        assert_eq!(root.password, "Xq9generated");
        assert_eq!(root.url, "https://172.18.1.100/auth/admin/");
        assert!(root.generated);
    }

    #[test]
    fn test_excluded_stages_are_skipped() {
        let config = config("project_name: demo\nprovider: local\n");
        let summary = DeploySummary::from_outputs(&config, &StageOutputs::new());
        assert!(summary.is_empty());
    }
}
