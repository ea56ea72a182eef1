//! Cloudflare error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Cloudflare required environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("Cloudflare zone {0} not found")]
    ZoneNotFound(String),

    #[error("Domain '{0}' needs at least two labels to derive a zone")]
    InvalidDomain(String),

    #[error("Cloudflare API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CloudflareError>;
