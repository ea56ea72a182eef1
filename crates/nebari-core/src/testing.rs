//! Spy stages and a no-op engine for driver tests.

use crate::error::{NebariError, Result};
use crate::outputs::StageOutputs;
use crate::registry::StageFactory;
use crate::scope::StageScope;
use crate::stage::{FileContent, RenderedFiles, Stage};
use async_trait::async_trait;
use nebari_config::NebariConfig;
use nebari_tofu::{ExecEnv, InfraEngine, Outputs};
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// `(event, env keys visible at that moment)`
pub(crate) type EventLog = Arc<Mutex<Vec<(String, Vec<String>)>>>;

pub(crate) struct StubStage {
    name: String,
    priority: i32,
    log: EventLog,
    files: RenderedFiles,
    exports: Vec<String>,
    fail_deploy: bool,
    fail_check: bool,
    fail_destroy: bool,
    fail_teardown: bool,
}

impl StubStage {
    pub(crate) fn new(name: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            log: Self::log(),
            files: RenderedFiles::new(),
            exports: Vec::new(),
            fail_deploy: false,
            fail_check: false,
            fail_destroy: false,
            fail_teardown: false,
        }
    }

    pub(crate) fn log() -> EventLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub(crate) fn events(log: &EventLog) -> Vec<String> {
        log.lock().unwrap().iter().map(|(event, _)| event.clone()).collect()
    }

    pub(crate) fn env_seen(log: &EventLog, event: &str) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .find(|(e, _)| e == event)
            .map(|(_, keys)| keys.clone())
            .unwrap_or_default()
    }

    pub(crate) fn logging(mut self, log: &EventLog) -> Self {
        self.log = log.clone();
        self
    }

    pub(crate) fn with_file(mut self, path: &str, text: &str) -> Self {
        self.files.insert(path.to_string(), FileContent::from(text));
        self
    }

    /// The stage's scope carries this variable.
    pub(crate) fn exporting(mut self, key: &str) -> Self {
        self.exports.push(key.to_string());
        self
    }

    pub(crate) fn failing_deploy(mut self) -> Self {
        self.fail_deploy = true;
        self
    }

    pub(crate) fn failing_check(mut self) -> Self {
        self.fail_check = true;
        self
    }

    pub(crate) fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub(crate) fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    fn record(&self, event: &str, env: &ExecEnv) {
        self.log.lock().unwrap().push((
            format!("{}:{}", event, self.name),
            env.keys().map(str::to_string).collect(),
        ));
    }

    fn scope(&self) -> StageScope {
        let env: ExecEnv = self.exports.iter().map(|k| (k.clone(), "1")).collect();
        let log = self.log.clone();
        let event = format!("release:{}", self.name);
        StageScope::with_env(&self.name, env)
            .on_release(move || log.lock().unwrap().push((event, Vec::new())))
    }
}

#[async_trait]
impl Stage for StubStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn render(&self) -> Result<RenderedFiles> {
        Ok(self.files.clone())
    }

    async fn deploy(&self, outputs: &mut StageOutputs, env: &ExecEnv) -> Result<StageScope> {
        self.record("deploy", env);
        if self.fail_deploy {
            return Err(NebariError::Stage("apply failed".into()));
        }
        let mut published = Map::new();
        published.insert("name".into(), json!({"value": self.name}));
        outputs.insert(&self.name, published)?;
        Ok(self.scope())
    }

    async fn check(&self, _outputs: &StageOutputs, env: &ExecEnv) -> Result<()> {
        self.record("check", env);
        if self.fail_check {
            return Err(NebariError::check(&self.name, "not ready"));
        }
        Ok(())
    }

    async fn destroy(&self, outputs: &mut StageOutputs, env: &ExecEnv) -> Result<StageScope> {
        self.record("destroy", env);
        if self.fail_destroy {
            return Err(NebariError::Stage("output refresh failed".into()));
        }
        outputs.insert(&self.name, Map::new())?;
        Ok(self.scope())
    }

    async fn teardown(&self, _outputs: &StageOutputs, env: &ExecEnv) -> Result<()> {
        self.record("teardown", env);
        if self.fail_teardown {
            return Err(NebariError::Stage("destroy failed".into()));
        }
        Ok(())
    }
}

pub(crate) struct NoopEngine;

impl NoopEngine {
    pub(crate) fn arc() -> Arc<dyn InfraEngine> {
        Arc::new(NoopEngine)
    }
}

#[async_trait]
impl InfraEngine for NoopEngine {
    async fn init(&self, _directory: &Path, _env: &ExecEnv) -> nebari_tofu::Result<()> {
        Ok(())
    }

    async fn apply(
        &self,
        _directory: &Path,
        _targets: &[String],
        _var_files: &[PathBuf],
        _env: &ExecEnv,
    ) -> nebari_tofu::Result<()> {
        Ok(())
    }

    async fn destroy(
        &self,
        _directory: &Path,
        _targets: &[String],
        _var_files: &[PathBuf],
        _env: &ExecEnv,
    ) -> nebari_tofu::Result<()> {
        Ok(())
    }

    async fn output(&self, _directory: &Path, _env: &ExecEnv) -> nebari_tofu::Result<Outputs> {
        Ok(Outputs::new())
    }

    async fn import(
        &self,
        _directory: &Path,
        _address: &str,
        _id: &str,
        _var_files: &[PathBuf],
        _exist_ok: bool,
        _env: &ExecEnv,
    ) -> nebari_tofu::Result<()> {
        Ok(())
    }
}

pub(crate) fn minimal_config() -> NebariConfig {
    nebari_config::parse_configuration(
        "project_name: demo\nprovider: local\n",
        Path::new("nebari-config.yaml"),
        false,
        &BTreeMap::new(),
    )
    .unwrap()
}

pub(crate) fn factory(engine: Arc<dyn InfraEngine>) -> StageFactory {
    StageFactory::new("/tmp/nebari-out", Arc::new(minimal_config()), engine)
}
