//! `04-kubernetes-ingress`: traefik, certificates and the public address.
//!
//! After the apply the load balancer address is known; with Cloudflare
//! auto-provisioning enabled the domain is pointed at it right away.

use super::{KUBERNETES_INGRESS, cluster_objects, node_selectors};
use crate::checks::{dns_backoff_policy, readiness_policy, resolve, wait_for_dns, wait_for_tcp};
use crate::terraform::{TerraformStageBody, output_value};
use async_trait::async_trait;
use nebari_cloudflare::{CloudflareDns, DnsConfig, RecordType};
use nebari_config::{CertificateKind, NebariConfig, ProviderKind};
use nebari_core::{NebariError, Result, StageFactory, StageOutputs};
use nebari_tofu::{ExecEnv, Outputs};
use serde_json::{Map, Value, json};

pub const TRAEFIK_IMAGE_TAG: &str = "2.9.1";

/// http, https, jupyterhub-ssh, jupyterhub-sftp, minio, dask-scheduler
pub const INGRESS_PORTS: [u16; 6] = [80, 443, 8022, 8023, 9080, 8786];

/// Hostname or ip from a `load_balancer_address` output, trimmed.
pub fn load_balancer_host(address: &Value) -> Option<String> {
    ["hostname", "ip"]
        .iter()
        .filter_map(|key| address.get(*key).and_then(Value::as_str))
        .map(|host| host.trim().to_string())
        .find(|host| !host.is_empty())
}

fn published_host(outputs: &StageOutputs) -> Result<String> {
    let address = outputs.value(KUBERNETES_INGRESS, "load_balancer_address")?;
    load_balancer_host(address).ok_or_else(|| NebariError::MissingOutput {
        stage: nebari_core::stage_key(KUBERNETES_INGRESS),
        key: "load_balancer_address.hostname|ip".into(),
    })
}

fn certificate_vars(config: &NebariConfig) -> Map<String, Value> {
    let certificate = &config.certificate;
    let mut vars = Map::new();
    vars.insert("certificate-service".into(), json!(certificate.kind.as_str()));
    match certificate.kind {
        CertificateKind::LetsEncrypt => {
            vars.insert("acme-email".into(), json!(certificate.acme_email));
            vars.insert("acme-server".into(), json!(certificate.acme_server));
        }
        CertificateKind::Existing => {
            vars.insert("certificate-secret-name".into(), json!(certificate.secret_name));
        }
        _ => {}
    }
    vars
}

pub struct KubernetesIngress;

impl KubernetesIngress {
    async fn provision_dns(&self, config: &NebariConfig, host: &str) -> Result<()> {
        let Some(domain) = config.domain.as_deref() else {
            tracing::info!("no domain configured, services are reachable at {}", host);
            return Ok(());
        };

        let auto_cloudflare = config.dns.auto_provision && config.dns.provider.as_deref() == Some("cloudflare");
        if !auto_cloudflare {
            tracing::info!("point the DNS record for {} at {}", domain, host);
            return Ok(());
        }

        let record_type = match config.provider {
            ProviderKind::Do | ProviderKind::Gcp | ProviderKind::Azure => RecordType::A,
            ProviderKind::Aws => RecordType::Cname,
            ProviderKind::Local | ProviderKind::Existing => {
                tracing::info!(provider = %config.provider, "DNS records are not managed for this provider");
                return Ok(());
            }
        };

        let dns = CloudflareDns::new(DnsConfig::from_env().map_err(|e| NebariError::Stage(e.to_string()))?);
        dns.upsert_record(domain, record_type, host)
            .await
            .map_err(|e| NebariError::Stage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TerraformStageBody for KubernetesIngress {
    const NAME: &'static str = KUBERNETES_INGRESS;
    const PRIORITY: i32 = 40;

    fn input_schema(&self) -> &'static [&'static str] {
        &["certificate", "ingress", "dns", "domain"]
    }

    fn output_schema(&self) -> &'static [&'static str] {
        &["load_balancer_address", "domain"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[super::INFRASTRUCTURE]
    }

    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        cluster_objects(KUBERNETES_INGRESS, &factory.config)
    }

    fn input_vars(&self, factory: &StageFactory, outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let config = &factory.config;
        let mut vars = Map::new();
        vars.insert(
            "traefik-image".into(),
            json!({"image": "traefik", "tag": TRAEFIK_IMAGE_TAG}),
        );
        vars.insert("name".into(), json!(config.project_name));
        vars.insert("environment".into(), json!(config.namespace));
        vars.insert("node_groups".into(), node_selectors(outputs)?);
        vars.extend(config.ingress.terraform_overrides.clone());
        vars.extend(certificate_vars(config));
        Ok(vars)
    }

    fn set_outputs(&self, factory: &StageFactory, _outputs: &StageOutputs, published: &mut Outputs) -> Result<()> {
        let domain = match &factory.config.domain {
            Some(domain) => domain.clone(),
            None => published
                .get("load_balancer_address")
                .map(|entry| entry.get("value").unwrap_or(entry))
                .and_then(load_balancer_host)
                .ok_or_else(|| NebariError::MissingOutput {
                    stage: nebari_core::stage_key(KUBERNETES_INGRESS),
                    key: "load_balancer_address".into(),
                })?,
        };
        published.insert("domain".into(), output_value(json!(domain)));
        Ok(())
    }

    async fn post_deploy(&self, factory: &StageFactory, outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        let host = published_host(outputs)?;
        self.provision_dns(&factory.config, &host).await
    }

    async fn check(&self, _factory: &StageFactory, outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        let host = published_host(outputs)?;
        let policy = readiness_policy();
        for port in INGRESS_PORTS {
            wait_for_tcp(&host, port, &policy).await.map_err(|e| {
                NebariError::check(
                    KUBERNETES_INGRESS,
                    format!("unable to connect to ingress host={} port={}: {}", host, port, e),
                )
            })?;
        }
        tracing::info!(stage = KUBERNETES_INGRESS, ports = ?INGRESS_PORTS, "kubernetes ingress available");

        let expected = resolve(&host).await?;
        let domain = outputs.str_value(KUBERNETES_INGRESS, "domain")?;
        wait_for_dns(domain, &expected, &policy, &dns_backoff_policy())
            .await
            .map_err(|e| NebariError::check(KUBERNETES_INGRESS, e.to_string()))
    }
}
