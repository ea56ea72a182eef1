//! Cloudflare DNS API client
//!
//! Bearer token authentication against the v4 REST API.

use crate::error::{CloudflareError, Result};
use serde::{Deserialize, Serialize};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Environment variable holding the API token.
pub const CLOUDFLARE_TOKEN_ENV: &str = "CLOUDFLARE_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Cname,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecordInfo {
    pub id: String,
    pub name: String,
    pub record_type: String,
    pub content: String,
    pub ttl: Option<u32>,
    pub proxied: bool,
}

/// Configuration for DNS manager
#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub api_token: String,
}

impl DnsConfig {
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var(CLOUDFLARE_TOKEN_ENV)
            .map_err(|_| CloudflareError::MissingEnvVar(CLOUDFLARE_TOKEN_ENV.to_string()))?;
        Ok(Self { api_token })
    }
}

/// Splits `a.b.example.com` into record `a.b` and zone `example.com`.
pub fn split_domain(domain: &str) -> Result<(String, String)> {
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(CloudflareError::InvalidDomain(domain.to_string()));
    }
    let split = labels.len() - 2;
    Ok((labels[..split].join("."), labels[split..].join(".")))
}

/// Cloudflare DNS manager
pub struct CloudflareDns {
    client: reqwest::Client,
    api_token: String,
    api_base: String,
}

impl CloudflareDns {
    pub fn new(config: DnsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_token: config.api_token,
            api_base: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    /// Points the client at another API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Looks up the id of a zone by name.
    pub async fn zone_id(&self, zone_name: &str) -> Result<String> {
        let url = format!("{}/zones", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[("name", zone_name)])
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let zones: Vec<ApiZone> = unwrap_response(response.json().await?)?;
        zones
            .into_iter()
            .find(|zone| zone.name == zone_name)
            .map(|zone| zone.id)
            .ok_or_else(|| CloudflareError::ZoneNotFound(zone_name.to_string()))
    }

    /// Finds a record by fully qualified name.
    pub async fn find_record(&self, zone_id: &str, fqdn: &str) -> Result<Option<DnsRecordInfo>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let response = self
            .client
            .get(&url)
            .query(&[("name", fqdn)])
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let records: Vec<ApiDnsRecord> = unwrap_response(response.json().await?)?;
        Ok(records
            .into_iter()
            .find(|r| r.name == fqdn)
            .map(DnsRecordInfo::from))
    }

    pub async fn create_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<DnsRecordInfo> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&DnsRecordRequest::new(fqdn, record_type, content))
            .send()
            .await?;

        let record: ApiDnsRecord = unwrap_response(response.json().await?)?;
        Ok(record.into())
    }

    /// Replaces a record's type and content.
    pub async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        fqdn: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<DnsRecordInfo> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, zone_id, record_id
        );
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&DnsRecordRequest::new(fqdn, record_type, content))
            .send()
            .await?;

        let record: ApiDnsRecord = unwrap_response(response.json().await?)?;
        Ok(record.into())
    }

    /// Creates the record for `domain`, or updates it when it already exists.
    pub async fn upsert_record(
        &self,
        domain: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<DnsRecordInfo> {
        let (record_name, zone_name) = split_domain(domain)?;
        let fqdn = if record_name.is_empty() {
            zone_name.clone()
        } else {
            format!("{}.{}", record_name, zone_name)
        };
        let zone_id = self.zone_id(&zone_name).await?;

        if let Some(existing) = self.find_record(&zone_id, &fqdn).await? {
            if existing.content == content && existing.record_type == record_type.as_str() {
                tracing::debug!("DNS record already up to date: {}", existing.name);
                return Ok(existing);
            }
            tracing::info!(
                "Updating DNS record {} {} from {} to {}",
                record_type.as_str(),
                existing.name,
                existing.content,
                content
            );
            return self
                .update_record(&zone_id, &existing.id, &fqdn, record_type, content)
                .await;
        }

        tracing::info!("Creating DNS record {} {} -> {}", record_type.as_str(), fqdn, content);
        self.create_record(&zone_id, &fqdn, record_type, content).await
    }
}

fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T> {
    if !response.success {
        let message = response
            .errors
            .first()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(CloudflareError::ApiError(message));
    }
    response
        .result
        .ok_or_else(|| CloudflareError::ApiError("response without result".to_string()))
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiDnsRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    r#type: String,
    content: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    proxied: bool,
}

impl From<ApiDnsRecord> for DnsRecordInfo {
    fn from(r: ApiDnsRecord) -> Self {
        DnsRecordInfo {
            id: r.id,
            name: r.name,
            record_type: r.r#type,
            content: r.content,
            ttl: r.ttl,
            proxied: r.proxied,
        }
    }
}

#[derive(Debug, Serialize)]
struct DnsRecordRequest {
    #[serde(rename = "type")]
    r#type: String,
    name: String,
    content: String,
    ttl: u32,
    proxied: bool,
}

impl DnsRecordRequest {
    fn new(name: &str, record_type: RecordType, content: &str) -> Self {
        Self {
            r#type: record_type.as_str().to_string(),
            name: name.to_string(),
            content: content.to_string(),
            ttl: 1, // Auto
            proxied: false,
        }
    }
}
