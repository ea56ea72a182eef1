//! kubectl CLI wrapper
//!
//! Only what the cluster checks need: listing namespaces through a kubeconfig.

use nebari_core::{NebariError, Result};
use nebari_tofu::ExecEnv;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Overrides the kubectl binary.
pub const KUBECTL_BINARY_ENV: &str = "NEBARI_KUBECTL_BINARY";

#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(KUBECTL_BINARY_ENV).unwrap_or_else(|_| "kubectl".to_string()))
    }

    /// Run a kubectl command and return stdout
    async fn run_command(&self, kubeconfig: &Path, args: &[&str], env: &ExecEnv) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--kubeconfig").arg(kubeconfig);
        cmd.args(args);
        cmd.envs(env.iter());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(
            "Running: {} --kubeconfig {} {}",
            self.binary,
            kubeconfig.display(),
            args.join(" ")
        );

        let output = cmd.output().await.map_err(|e| {
            NebariError::Stage(format!("failed to run {}: {}", self.binary, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NebariError::Stage(format!(
                "{} {} failed: {}",
                self.binary,
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Names of every namespace in the cluster.
    pub async fn namespaces(&self, kubeconfig: &Path, env: &ExecEnv) -> Result<Vec<String>> {
        let output = self
            .run_command(kubeconfig, &["get", "namespaces", "--output", "json"], env)
            .await?;
        let list: NamespaceList = serde_json::from_str(&output)?;
        Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
    }
}

#[derive(Debug, Deserialize)]
struct NamespaceList {
    #[serde(default)]
    items: Vec<Namespace>,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
}
