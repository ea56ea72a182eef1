//! Cloudflare DNS provisioning
//!
//! Points the ingress domain at the load balancer by creating or updating a
//! single `A` or `CNAME` record through the Cloudflare v4 API.

pub mod dns;
pub mod error;

pub use dns::{CLOUDFLARE_TOKEN_ENV, CloudflareDns, DnsConfig, DnsRecordInfo, RecordType, split_domain};
pub use error::{CloudflareError, Result};
