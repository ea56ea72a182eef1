use super::BOOTSTRAP;
use crate::cicd::{CiContext, render_cicd};
use crate::credentials::check_cloud_credentials;
use async_trait::async_trait;
use nebari_core::{NebariError, RenderedFiles, Result, Stage, StageFactory, StageOutputs, StageScope};
use nebari_tofu::ExecEnv;
use serde_json::Map;

/// Repository scaffolding: `.gitignore` and the CI pipeline files.
pub struct BootstrapStage {
    factory: StageFactory,
    ci: CiContext,
}

impl BootstrapStage {
    pub fn new(factory: &StageFactory) -> Self {
        Self {
            factory: factory.clone(),
            ci: CiContext::from_env(),
        }
    }
}

#[async_trait]
impl Stage for BootstrapStage {
    fn name(&self) -> &str {
        BOOTSTRAP
    }

    fn priority(&self) -> i32 {
        0
    }

    fn input_schema(&self) -> &'static [&'static str] {
        &["ci_cd"]
    }

    fn render(&self) -> Result<RenderedFiles> {
        render_cicd(&self.factory.config, &self.ci)
    }

    async fn deploy(&self, outputs: &mut StageOutputs, _env: &ExecEnv) -> Result<StageScope> {
        outputs.insert(BOOTSTRAP, Map::new())?;
        Ok(StageScope::empty(BOOTSTRAP))
    }

    async fn check(&self, _outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        check_cloud_credentials(&self.factory.config)
            .map_err(|e| NebariError::check(BOOTSTRAP, e.to_string()))?;
        tracing::info!(provider = %self.factory.config.provider, "cloud credentials present");
        Ok(())
    }

    async fn destroy(&self, outputs: &mut StageOutputs, _env: &ExecEnv) -> Result<StageScope> {
        outputs.insert(BOOTSTRAP, Map::new())?;
        Ok(StageScope::empty(BOOTSTRAP))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, config, factory};
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_check_reports_missing_credentials() {
        let out = tempfile::tempdir().unwrap();
        let stage = BootstrapStage::new(&factory(
            config("project_name: demo\nprovider: gcp\ngoogle_cloud_platform:\n  project: p\n  region: r\n"),
            out.path(),
            FakeEngine::new(),
        ));
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let err = temp_env::with_vars(
            [("GOOGLE_CREDENTIALS", None::<&str>), ("PROJECT_ID", Some("p"))],
            || runtime.block_on(stage.check(&StageOutputs::new(), &ExecEnv::new())),
        )
        .unwrap_err();

        assert!(matches!(err, NebariError::CheckFailed { ref stage, .. } if stage == "bootstrap"));
        assert!(err.to_string().contains("GOOGLE_CREDENTIALS"));
    }

    #[tokio::test]
    async fn test_render_and_deploy() {
        let out = tempfile::tempdir().unwrap();
        let stage = BootstrapStage::new(&factory(
            config("project_name: demo\nprovider: local\nci_cd:\n  type: github-actions\n"),
            out.path(),
            FakeEngine::new(),
        ));

        let files = stage.render().unwrap();
        assert!(files.contains_key(".github/workflows/nebari-ops.yaml"));
        assert!(files.contains_key(".gitignore"));

        let mut outputs = StageOutputs::new();
        stage.deploy(&mut outputs, &ExecEnv::new()).await.unwrap();
        stage.check(&outputs, &ExecEnv::new()).await.unwrap();
        assert!(outputs.contains("bootstrap"));
    }
}
