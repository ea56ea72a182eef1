use nebari_config::ConfigError;
use nebari_tofu::TofuError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NebariError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tofu(#[from] TofuError),

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<NebariError>,
    },

    #[error("Check failed for stage '{stage}': {reason}")]
    CheckFailed { stage: String, reason: String },

    #[error("{0}")]
    Stage(String),

    #[error("Duplicate stage name '{0}'; stage names must be unique")]
    DuplicateStage(String),

    #[error("Invalid stage exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Stage '{stage}' has no output '{key}'")]
    MissingOutput { stage: String, key: String },

    #[error("Outputs for '{0}' were already recorded in this run")]
    OutputsAlreadyRecorded(String),

    #[error("Path '{path}' escapes the output directory {root}")]
    PathEscape { path: String, root: PathBuf },

    #[error(
        "Refusing to render into the home directory {0}\n\
        Pass a dedicated output directory with --output"
    )]
    HomeDirectory(PathBuf),

    #[error("Missing cloud credentials for provider '{provider}': {missing}")]
    MissingCredentials { provider: String, missing: String },

    #[error(
        "Deployment prevented: prevent_deploy is set in the configuration\n\
        This usually means the cluster was created with an older release and needs a manual migration"
    )]
    DeployPrevented,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl NebariError {
    pub fn check(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        NebariError::CheckFailed {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Attributes an error to a stage unless it already names one.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            e @ (NebariError::StageFailed { .. } | NebariError::CheckFailed { .. }) => e,
            other => NebariError::StageFailed {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, NebariError>;
