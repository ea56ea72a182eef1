//! Engine abstraction and the per-stage deploy sequence.

use crate::cli::Tofu;
use crate::env::ExecEnv;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Parsed `output -json`: name → `{"value": …, "type": …, "sensitive": …}`.
pub type Outputs = Map<String, Value>;

/// The declarative-infra operations a stage needs.
#[async_trait]
pub trait InfraEngine: Send + Sync {
    async fn init(&self, directory: &Path, env: &ExecEnv) -> Result<()>;

    async fn apply(
        &self,
        directory: &Path,
        targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> Result<()>;

    async fn destroy(
        &self,
        directory: &Path,
        targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> Result<()>;

    async fn output(&self, directory: &Path, env: &ExecEnv) -> Result<Outputs>;

    async fn import(
        &self,
        directory: &Path,
        address: &str,
        id: &str,
        var_files: &[PathBuf],
        exist_ok: bool,
        env: &ExecEnv,
    ) -> Result<()>;
}

#[async_trait]
impl InfraEngine for Tofu {
    async fn init(&self, directory: &Path, env: &ExecEnv) -> Result<()> {
        Tofu::init(self, directory, env).await
    }

    async fn apply(
        &self,
        directory: &Path,
        targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> Result<()> {
        Tofu::apply(self, directory, targets, var_files, env).await
    }

    async fn destroy(
        &self,
        directory: &Path,
        targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> Result<()> {
        Tofu::destroy(self, directory, targets, var_files, env).await
    }

    async fn output(&self, directory: &Path, env: &ExecEnv) -> Result<Outputs> {
        Tofu::output(self, directory, env).await
    }

    async fn import(
        &self,
        directory: &Path,
        address: &str,
        id: &str,
        var_files: &[PathBuf],
        exist_ok: bool,
        env: &ExecEnv,
    ) -> Result<()> {
        Tofu::import(self, directory, address, id, var_files, exist_ok, env).await
    }
}

/// A resource to adopt into state before the first apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateImport {
    pub address: String,
    pub id: String,
}

impl StateImport {
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }
}

/// What [`deploy`] should do in one stage directory.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub directory: PathBuf,
    pub input_vars: Map<String, Value>,
    pub state_imports: Vec<StateImport>,
    pub targets: Vec<String>,
    pub tofu_init: bool,
    pub tofu_import: bool,
    pub tofu_apply: bool,
    pub tofu_destroy: bool,
}

impl DeployRequest {
    /// init + apply, no imports.
    pub fn apply(directory: impl Into<PathBuf>, input_vars: Map<String, Value>) -> Self {
        Self {
            directory: directory.into(),
            input_vars,
            state_imports: Vec::new(),
            targets: Vec::new(),
            tofu_init: true,
            tofu_import: false,
            tofu_apply: true,
            tofu_destroy: false,
        }
    }

    /// init + destroy.
    pub fn destroy(directory: impl Into<PathBuf>, input_vars: Map<String, Value>) -> Self {
        Self {
            tofu_apply: false,
            tofu_destroy: true,
            ..Self::apply(directory, input_vars)
        }
    }

    /// init + output only, used to refresh outputs without changing anything.
    pub fn refresh(directory: impl Into<PathBuf>) -> Self {
        Self {
            tofu_apply: false,
            ..Self::apply(directory, Map::new())
        }
    }

    pub fn with_imports(mut self, imports: Vec<StateImport>) -> Self {
        self.tofu_import = !imports.is_empty();
        self.state_imports = imports;
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }
}

/// Runs init → imports → apply → destroy as requested and returns the outputs.
///
/// Input variables are written to a temporary `.tfvars.json` that lives for
/// the duration of the call.
pub async fn deploy(
    engine: &dyn InfraEngine,
    request: &DeployRequest,
    env: &ExecEnv,
) -> Result<Outputs> {
    let mut var_file = tempfile::Builder::new()
        .prefix("nebari-")
        .suffix(".tfvars.json")
        .tempfile()?;
    serde_json::to_writer(var_file.as_file_mut(), &request.input_vars)?;
    var_file.as_file_mut().flush()?;
    let var_files = vec![var_file.path().to_path_buf()];
    let directory = request.directory.as_path();

    if request.tofu_init {
        engine.init(directory, env).await?;
    }

    if request.tofu_import {
        for import in &request.state_imports {
            engine
                .import(directory, &import.address, &import.id, &var_files, true, env)
                .await?;
        }
    }

    if request.tofu_apply {
        engine
            .apply(directory, &request.targets, &var_files, env)
            .await?;
    }

    if request.tofu_destroy {
        engine
            .destroy(directory, &request.targets, &var_files, env)
            .await?;
    }

    engine.output(directory, env).await
}
