//! Destruction driver.
//!
//! Destroy scopes are entered in ascending priority so every stage can
//! refresh the outputs later stages need for their input variables. The
//! teardown itself happens while unwinding, newest scope first, so dependent
//! resources go before the foundation they sit on. The first failure stops
//! everything: nothing further is entered or torn down.

use crate::outputs::StageOutputs;
use crate::scope::ScopeStack;
use crate::stage::Stage;

/// Per-stage destroy result in the order stages were reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentStatus {
    entries: Vec<(String, bool)>,
}

impl DeploymentStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: impl Into<String>, success: bool) {
        self.entries.push((stage.into(), success));
    }

    pub fn get(&self, stage: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, success)| *success)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(name, ok)| (name.as_str(), *ok))
    }

    /// True when every attempted stage succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|(_, ok)| *ok)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub async fn destroy_stages(stages: &[Box<dyn Stage>]) -> DeploymentStatus {
    let mut outputs = StageOutputs::new();
    let mut status = DeploymentStatus::new();
    let mut scopes = ScopeStack::new();
    let mut entered: Vec<&dyn Stage> = Vec::new();

    for stage in stages {
        let env = scopes.env();
        tracing::info!(stage = stage.name(), "preparing stage for destroy");
        match stage.destroy(&mut outputs, &env).await {
            Ok(scope) => {
                scopes.push(scope);
                entered.push(stage.as_ref());
            }
            Err(e) => {
                tracing::error!(stage = stage.name(), "failed to prepare destroy: {}", e);
                status.record(stage.name(), false);
                return status;
            }
        }
    }

    while let Some(stage) = entered.pop() {
        // own layer goes first, lower stages stay visible
        drop(scopes.pop());
        let env = scopes.env();

        tracing::info!(stage = stage.name(), "destroying stage");
        match stage.teardown(&outputs, &env).await {
            Ok(()) => {
                tracing::info!(stage = stage.name(), "destroyed stage");
                status.record(stage.name(), true);
            }
            Err(e) => {
                tracing::error!(stage = stage.name(), "failed to destroy: {}", e);
                status.record(stage.name(), false);
                break;
            }
        }
    }

    status
}
