//! Fake engine, config helpers and a mocked Keycloak for stage tests.

use async_trait::async_trait;
use nebari_config::NebariConfig;
use nebari_core::StageFactory;
use nebari_tofu::{ExecEnv, InfraEngine, Outputs};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use mockito::{Matcher, Mock, ServerGuard};

pub(crate) fn config(yaml: &str) -> NebariConfig {
    nebari_config::parse_configuration(yaml, Path::new("nebari-config.yaml"), false, &BTreeMap::new())
        .unwrap()
}

pub(crate) fn factory(config: NebariConfig, output: &Path, engine: Arc<dyn InfraEngine>) -> StageFactory {
    StageFactory::new(output, Arc::new(config), engine)
}

/// Wraps plain values in the `{"value": ...}` shape `tofu output -json` uses.
pub(crate) fn tool_outputs(value: Value) -> Outputs {
    value
        .as_object()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let mut wrapper = Map::new();
            wrapper.insert("value".into(), value);
            (key, Value::Object(wrapper))
        })
        .collect()
}

/// In-memory engine keyed by stage name (the directory segment after `stages/`).
#[derive(Default)]
pub(crate) struct FakeEngine {
    outputs: Mutex<BTreeMap<String, Outputs>>,
    calls: Mutex<Vec<String>>,
    var_files: Mutex<BTreeMap<String, Value>>,
    envs: Mutex<BTreeMap<String, ExecEnv>>,
    failing_apply: Mutex<Option<String>>,
}

impl FakeEngine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_outputs(self: &Arc<Self>, stage: &str, outputs: Value) -> Arc<Self> {
        self.outputs
            .lock()
            .unwrap()
            .insert(stage.to_string(), tool_outputs(outputs));
        self.clone()
    }

    pub(crate) fn failing_apply(self: &Arc<Self>, stage: &str) -> Arc<Self> {
        *self.failing_apply.lock().unwrap() = Some(stage.to_string());
        self.clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Input variables the last apply or destroy of `stage` received.
    pub(crate) fn vars(&self, stage: &str) -> Value {
        self.var_files
            .lock()
            .unwrap()
            .get(stage)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Environment of the last apply or destroy of `stage`.
    pub(crate) fn env(&self, stage: &str) -> ExecEnv {
        self.envs.lock().unwrap().get(stage).cloned().unwrap_or_default()
    }

    fn stage_of(directory: &Path) -> String {
        let parts: Vec<String> = directory
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        parts
            .iter()
            .position(|p| p == "stages")
            .and_then(|i| parts.get(i + 1))
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, action: &str, directory: &Path, var_files: &[PathBuf], env: &ExecEnv) {
        let stage = Self::stage_of(directory);
        self.calls.lock().unwrap().push(format!("{}:{}", action, stage));
        if let Some(path) = var_files.first() {
            let text = std::fs::read_to_string(path).unwrap();
            self.var_files
                .lock()
                .unwrap()
                .insert(stage.clone(), serde_json::from_str(&text).unwrap());
        }
        self.envs.lock().unwrap().insert(stage, env.clone());
    }
}

#[async_trait]
impl InfraEngine for FakeEngine {
    async fn init(&self, directory: &Path, _env: &ExecEnv) -> nebari_tofu::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("init:{}", Self::stage_of(directory)));
        Ok(())
    }

    async fn apply(
        &self,
        directory: &Path,
        _targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> nebari_tofu::Result<()> {
        self.record("apply", directory, var_files, env);
        let stage = Self::stage_of(directory);
        if self.failing_apply.lock().unwrap().as_deref() == Some(stage.as_str()) {
            return Err(nebari_tofu::TofuError::CommandFailed {
                command: "tofu apply".into(),
                code: 1,
                output: "Error: boom".into(),
            });
        }
        Ok(())
    }

    async fn destroy(
        &self,
        directory: &Path,
        _targets: &[String],
        var_files: &[PathBuf],
        env: &ExecEnv,
    ) -> nebari_tofu::Result<()> {
        self.record("destroy", directory, var_files, env);
        Ok(())
    }

    async fn output(&self, directory: &Path, _env: &ExecEnv) -> nebari_tofu::Result<Outputs> {
        let stage = Self::stage_of(directory);
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .get(&stage)
            .cloned()
            .unwrap_or_default())
    }

    async fn import(
        &self,
        directory: &Path,
        address: &str,
        _id: &str,
        _var_files: &[PathBuf],
        _exist_ok: bool,
        _env: &ExecEnv,
    ) -> nebari_tofu::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("import:{}:{}", Self::stage_of(directory), address));
        Ok(())
    }
}

/// Keycloak answering the master realm token request and the realm listing.
pub(crate) async fn mock_keycloak(server: &mut ServerGuard, realms: &str) -> (Mock, Mock) {
    let token = server
        .mock("POST", "/auth/realms/master/protocol/openid-connect/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "password".into()),
            Matcher::UrlEncoded("username".into(), "root".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok", "expires_in": 60}"#)
        .create_async()
        .await;
    let listing = server
        .mock("GET", "/auth/admin/realms")
        .match_header("authorization", "Bearer tok")
        .with_header("content-type", "application/json")
        .with_body(realms)
        .create_async()
        .await;
    (token, listing)
}
