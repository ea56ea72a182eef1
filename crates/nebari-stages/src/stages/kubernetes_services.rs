//! `07-kubernetes-services`: jupyterhub, dask-gateway, conda-store, monitoring and friends.

use super::{
    KEYCLOAK_CONFIGURATION, KUBERNETES_SERVICES, cluster_objects, ingress_domain, node_selectors,
    realm_id,
};
use crate::checks::{insecure_client, readiness_policy, wait_for_http};
use crate::terraform::TerraformStageBody;
use async_trait::async_trait;
use nebari_config::{CertificateKind, TfExtension};
use nebari_core::{NebariError, Result, StageFactory, StageOutputs};
use nebari_tofu::ExecEnv;
use reqwest::Url;
use serde_json::{Map, Value, json};

pub const FORWARDAUTH_MIDDLEWARE: &str = "traefik-forward-auth";

/// Configuration sections handed to the service modules under their own names.
pub const PASS_THROUGH_SECTIONS: &[&str] = &[
    "jupyterhub",
    "jupyterlab",
    "conda_store",
    "environments",
    "default_images",
    "profiles",
    "theme",
    "storage",
    "monitoring",
    "argo_workflows",
    "jhub_apps",
    "telemetry",
];

/// JupyterHub logout redirect that also logs out of every extension, innermost last.
pub fn logout_redirect_url(domain: &str, extensions: &[TfExtension]) -> Result<String> {
    let mut uri = format!("https://{}/hub/login", domain);
    for extension in extensions.iter().filter(|e| !e.logout.is_empty()) {
        let target = format!("https://{}/{}{}", domain, extension.urlslug, extension.logout);
        let mut url = Url::parse(&target).map_err(|e| {
            NebariError::Stage(format!("invalid logout url for extension {}: {}", extension.name, e))
        })?;
        url.query_pairs_mut().append_pair("redirect_uri", &uri);
        uri = url.to_string();
    }
    Ok(uri)
}

/// `(service, health_url)` for every service that publishes a health url.
fn health_urls(outputs: &StageOutputs) -> Result<Vec<(String, String)>> {
    let services = outputs.value(KUBERNETES_SERVICES, "service_urls")?;
    Ok(services
        .as_object()
        .into_iter()
        .flatten()
        .filter_map(|(name, service)| {
            service
                .get("health_url")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(|url| (name.clone(), url.to_string()))
        })
        .collect())
}

pub struct KubernetesServices;

#[async_trait]
impl TerraformStageBody for KubernetesServices {
    const NAME: &'static str = KUBERNETES_SERVICES;
    const PRIORITY: i32 = 70;

    fn input_schema(&self) -> &'static [&'static str] {
        PASS_THROUGH_SECTIONS
    }

    fn output_schema(&self) -> &'static [&'static str] {
        &["service_urls"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[KEYCLOAK_CONFIGURATION]
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        cluster_objects(KUBERNETES_SERVICES, &factory.config)
    }

    fn input_vars(&self, factory: &StageFactory, outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let config = &factory.config;
        let domain = ingress_domain(outputs)?;

        let mut vars = Map::new();
        vars.insert("name".into(), json!(config.project_name));
        vars.insert("environment".into(), json!(config.namespace));
        vars.insert("endpoint".into(), json!(domain));
        vars.insert("realm_id".into(), json!(realm_id(outputs)?));
        vars.insert("node_groups".into(), node_selectors(outputs)?);
        vars.insert(
            "jupyterhub-logout-redirect-url".into(),
            json!(logout_redirect_url(&domain, &config.tf_extensions)?),
        );
        vars.insert("forwardauth_middleware_name".into(), json!(FORWARDAUTH_MIDDLEWARE));
        let cert_secret_name = match config.certificate.kind {
            CertificateKind::Existing => config.certificate.secret_name.clone(),
            _ => None,
        };
        vars.insert("cert_secret_name".into(), json!(cert_secret_name));
        vars.insert("cloud_provider".into(), json!(config.provider.as_str()));
        for section in PASS_THROUGH_SECTIONS {
            if let Some(value) = config.section(section) {
                vars.insert((*section).to_string(), value.clone());
            }
        }
        Ok(vars)
    }

    async fn check(&self, _factory: &StageFactory, outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        let client = insecure_client()?;
        let policy = readiness_policy();
        for (service, url) in health_urls(outputs)? {
            wait_for_http(&client, &url, &policy).await.map_err(|e| {
                NebariError::check(
                    KUBERNETES_SERVICES,
                    format!("service {} DOWN when checking url={}: {}", service, url, e),
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{INFRASTRUCTURE, KUBERNETES_INGRESS};
    use crate::testing::{FakeEngine, config, factory, tool_outputs};
    use mockito::Server;

    fn upstream_outputs() -> StageOutputs {
        let mut outputs = StageOutputs::new();
        outputs
            .insert(INFRASTRUCTURE, tool_outputs(json!({"node_selectors": {}})))
            .unwrap();
        outputs
            .insert(KUBERNETES_INGRESS, tool_outputs(json!({"domain": "demo.example.com"})))
            .unwrap();
        outputs
            .insert(KEYCLOAK_CONFIGURATION, tool_outputs(json!({"realm_id": "nebari"})))
            .unwrap();
        outputs
    }

    fn extension(name: &str, urlslug: &str, logout: &str) -> TfExtension {
        TfExtension {
            name: name.into(),
            urlslug: urlslug.into(),
            logout: logout.into(),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_logout_chain_without_extensions() {
        assert_eq!(
            logout_redirect_url("demo.example.com", &[]).unwrap(),
            "https://demo.example.com/hub/login"
        );
    }

    #[test]
    fn test_logout_chain_wraps_each_extension() {
        let extensions = vec![
            extension("first", "first", "/logout"),
            extension("quiet", "quiet", ""),
            extension("second", "second", "/signout"),
        ];
        let uri = logout_redirect_url("demo.example.com", &extensions).unwrap();

        assert_eq!(
            uri,
            "https://demo.example.com/second/signout?redirect_uri=\
             https%3A%2F%2Fdemo.example.com%2Ffirst%2Flogout%3Fredirect_uri%3D\
             https%253A%252F%252Fdemo.example.com%252Fhub%252Flogin"
        );
    }

    #[test]
    fn test_input_vars_pass_sections_through() {
        let out = tempfile::tempdir().unwrap();
        let factory = factory(
            config(
                "project_name: demo\nprovider: local\ncertificate:\n  type: existing\n  secret_name: wildcard\njupyterhub:\n  overrides:\n    singleuser:\n      cpu_limit: 2\nmonitoring:\n  enabled: false\n",
            ),
            out.path(),
            FakeEngine::new(),
        );

        let vars = KubernetesServices.input_vars(&factory, &upstream_outputs()).unwrap();
        assert_eq!(vars["endpoint"], "demo.example.com");
        assert_eq!(vars["realm_id"], "nebari");
        assert_eq!(vars["cert_secret_name"], "wildcard");
        assert_eq!(vars["cloud_provider"], "local");
        assert_eq!(vars["forwardauth_middleware_name"], FORWARDAUTH_MIDDLEWARE);
        assert_eq!(vars["jupyterhub-logout-redirect-url"], "https://demo.example.com/hub/login");
        assert_eq!(vars["jupyterhub"]["overrides"]["singleuser"]["cpu_limit"], 2);
        assert_eq!(vars["monitoring"], json!({"enabled": false}));
        assert!(!vars.contains_key("argo_workflows"));
    }

    #[tokio::test]
    async fn test_check_polls_health_urls() {
        let mut server = Server::new_async().await;
        let health = server
            .mock("GET", "/hub/api/")
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let base = server.url();
        let mut outputs = StageOutputs::new();
        outputs
            .insert(
                KUBERNETES_SERVICES,
                tool_outputs(json!({"service_urls": {
                    "jupyterhub": {"url": "https://demo.example.com/", "health_url": format!("{}/hub/api/", base)},
                    "monitoring": {"url": "https://demo.example.com/monitoring/", "health_url": null},
                }})),
            )
            .unwrap();

        let out = tempfile::tempdir().unwrap();
        let factory = factory(config("project_name: demo\nprovider: local\n"), out.path(), FakeEngine::new());
        KubernetesServices
            .check(&factory, &outputs, &ExecEnv::new())
            .await
            .unwrap();

        health.assert_async().await;
    }
}
