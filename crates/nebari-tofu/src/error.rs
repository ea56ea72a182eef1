//! OpenTofu adapter error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TofuError {
    #[error(
        "OpenTofu binary '{0}' not found\n\
        Install it or point NEBARI_TOFU_BINARY at it"
    )]
    NotFound(String),

    #[error("`{command}` exited with status {code}\n{output}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Unexpected output from `{command}`: {reason}")]
    InvalidOutput { command: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TofuError>;
