//! Deployment driver.

use crate::error::{NebariError, Result};
use crate::outputs::StageOutputs;
use crate::scope::ScopeStack;
use crate::stage::Stage;
use nebari_config::NebariConfig;

/// Stage that provisions the remote state backend.
pub const TERRAFORM_STATE_STAGE: &str = "01-terraform-state";

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub disable_checks: bool,
    pub skip_remote_state_provision: bool,
}

/// Refuses configurations flagged with `prevent_deploy`, then runs the stages.
pub async fn deploy_configuration(
    config: &NebariConfig,
    stages: &[Box<dyn Stage>],
    options: &DeployOptions,
) -> Result<StageOutputs> {
    if config.prevent_deploy {
        return Err(NebariError::DeployPrevented);
    }
    deploy_stages(stages, options).await
}

/// Deploys stages in order, checking each before the next is entered.
///
/// Every deploy scope stays open until the run ends so its environment layer
/// reaches the stages after it. Any error, including a failed check, stops
/// the run and releases the open scopes newest first.
pub async fn deploy_stages(
    stages: &[Box<dyn Stage>],
    options: &DeployOptions,
) -> Result<StageOutputs> {
    let mut outputs = StageOutputs::new();
    let mut scopes = ScopeStack::new();
    let total = stages.len();

    for (index, stage) in stages.iter().enumerate() {
        let name = stage.name();

        if options.skip_remote_state_provision && name == TERRAFORM_STATE_STAGE {
            tracing::info!(stage = name, "skipping remote state provision");
            continue;
        }

        tracing::info!(stage = name, priority = stage.priority(), "deploying stage {}/{}", index + 1, total);
        let env = scopes.env();
        let scope = stage
            .deploy(&mut outputs, &env)
            .await
            .map_err(|e| e.in_stage(name))?;
        scopes.push(scope);

        warn_missing_outputs(stage.as_ref(), &outputs);

        if options.disable_checks {
            tracing::warn!(stage = name, "checks disabled, skipping");
            continue;
        }

        let env = scopes.env();
        if let Err(e) = stage.check(&outputs, &env).await {
            tracing::error!(stage = name, "check failed: {}", e);
            return Err(match e {
                check @ NebariError::CheckFailed { .. } => check,
                other => NebariError::check(name, other.to_string()),
            });
        }
        tracing::info!(stage = name, "check passed");
    }

    scopes.release_all();
    Ok(outputs)
}

fn warn_missing_outputs(stage: &dyn Stage, outputs: &StageOutputs) {
    let published = outputs.get(stage.name());
    for key in stage.output_schema() {
        if !published.is_some_and(|map| map.contains_key(*key)) {
            tracing::warn!(stage = stage.name(), key, "declared output was not published");
        }
    }
}
