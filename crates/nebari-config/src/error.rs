use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found: {0}\n\
        Pass it with --config, set NEBARI_CONFIG_PATH, or run from a directory\n\
        containing nebari-config.yaml"
    )]
    NotFound(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot set '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error(
        "Environment override {var} could not be applied: {reason}\n\
        Overrides look like NEBARI_SECRET__ci_cd__branch=main"
    )]
    EnvOverride { var: String, reason: String },

    #[error(
        "'{placeholder}' was found in the configuration, so the environment variable '{var}' must be set"
    )]
    MissingSecret { placeholder: String, var: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
