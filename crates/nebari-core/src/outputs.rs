//! Per-run registry of stage outputs.

use crate::error::{NebariError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key under which a stage publishes: `stages/<name>`.
pub fn stage_key(stage: &str) -> String {
    format!("stages/{}", stage)
}

/// Outputs keyed by stage path. Each entry is written once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutputs {
    entries: BTreeMap<String, Map<String, Value>>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outputs of `stage`. A second write for the same stage is an error.
    pub fn insert(&mut self, stage: &str, outputs: Map<String, Value>) -> Result<()> {
        let key = stage_key(stage);
        if self.entries.contains_key(&key) {
            return Err(NebariError::OutputsAlreadyRecorded(key));
        }
        tracing::debug!(stage, keys = outputs.len(), "recorded stage outputs");
        self.entries.insert(key, outputs);
        Ok(())
    }

    pub fn get(&self, stage: &str) -> Option<&Map<String, Value>> {
        self.entries.get(&stage_key(stage))
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.entries.contains_key(&stage_key(stage))
    }

    /// Returns the unwrapped `value` of an output.
    pub fn value(&self, stage: &str, key: &str) -> Result<&Value> {
        let missing = || NebariError::MissingOutput {
            stage: stage_key(stage),
            key: key.to_string(),
        };
        let entry = self.get(stage).and_then(|m| m.get(key)).ok_or_else(missing)?;
        match entry {
            Value::Object(wrapper) if wrapper.contains_key("value") => {
                wrapper.get("value").ok_or_else(missing)
            }
            other => Ok(other),
        }
    }

    pub fn str_value(&self, stage: &str, key: &str) -> Result<&str> {
        self.value(stage, key)?
            .as_str()
            .ok_or_else(|| NebariError::MissingOutput {
                stage: stage_key(stage),
                key: format!("{} (as string)", key),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
