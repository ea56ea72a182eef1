//! The stage contract.

use crate::error::Result;
use crate::outputs::StageOutputs;
use crate::scope::StageScope;
use async_trait::async_trait;
use nebari_tofu::ExecEnv;
use std::collections::BTreeMap;

/// Content of one rendered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        FileContent::Text(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        FileContent::Text(text.to_string())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        FileContent::Binary(bytes)
    }
}

/// Relative path (always `/`-separated) → content.
pub type RenderedFiles = BTreeMap<String, FileContent>;

/// One unit of the pipeline.
///
/// Lifecycle per run:
/// - deploy path: `render` → `deploy` (scope stays open) → `check`
/// - destroy path: `destroy` (scope stays open, refreshes outputs) → `teardown`
///   when the scope is unwound
///
/// `deploy` is expected to record this stage's outputs in `outputs` exactly once.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name, also the directory segment under `stages/`.
    fn name(&self) -> &str;

    /// Global order; lower runs first.
    fn priority(&self) -> i32;

    /// Configuration keys this stage reads.
    fn input_schema(&self) -> &'static [&'static str] {
        &[]
    }

    /// Output keys this stage publishes.
    fn output_schema(&self) -> &'static [&'static str] {
        &[]
    }

    /// Stages whose outputs this stage reads. Advisory only.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Files this stage owns. Must be deterministic.
    fn render(&self) -> Result<RenderedFiles> {
        Ok(RenderedFiles::new())
    }

    async fn deploy(&self, _outputs: &mut StageOutputs, _env: &ExecEnv) -> Result<StageScope> {
        Ok(StageScope::empty(self.name()))
    }

    async fn check(&self, _outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self, _outputs: &mut StageOutputs, _env: &ExecEnv) -> Result<StageScope> {
        Ok(StageScope::empty(self.name()))
    }

    async fn teardown(&self, _outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        Ok(())
    }
}
