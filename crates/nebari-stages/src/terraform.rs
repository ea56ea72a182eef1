//! Generic terraform-backed stage.
//!
//! [`TerraformStage`] implements the [`Stage`] lifecycle once: render the
//! merged tf objects (plus any template tree) under the stage prefix, run
//! `nebari_tofu::deploy` against that directory and publish the outputs.
//! The per-stage specifics live in a [`TerraformStageBody`].

use crate::templates::template_files;
use async_trait::async_trait;
use nebari_core::{
    FileContent, RenderedFiles, Result, Stage, StageFactory, StageOutputs, StageScope,
};
use nebari_tofu::{DeployRequest, ExecEnv, Outputs, StateImport, render_objects};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const TF_OBJECTS_FILENAME: &str = "_nebari.tf.json";

/// Wraps a derived output in the `{"value": ...}` shape the tool reports.
pub fn output_value(value: Value) -> Value {
    serde_json::json!({ "value": value })
}

/// The stage-specific half of a terraform-backed stage.
#[async_trait]
pub trait TerraformStageBody: Send + Sync {
    const NAME: &'static str;
    const PRIORITY: i32;

    fn input_schema(&self) -> &'static [&'static str] {
        &[]
    }

    fn output_schema(&self) -> &'static [&'static str] {
        &[]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the stage directory is split per provider (`stages/<name>/<provider>`).
    fn per_provider(&self) -> bool {
        false
    }

    /// Provider and backend blocks merged into `_nebari.tf.json`.
    fn tf_objects(&self, factory: &StageFactory) -> Result<Vec<Value>> {
        Ok(crate::tf_objects::terraform_state(Self::NAME, &factory.config)?
            .into_iter()
            .collect())
    }

    fn input_vars(&self, _factory: &StageFactory, _outputs: &StageOutputs) -> Result<Map<String, Value>> {
        Ok(Map::new())
    }

    fn state_imports(&self, _factory: &StageFactory) -> Result<Vec<StateImport>> {
        Ok(Vec::new())
    }

    /// Adds derived entries to the tool outputs before they are published.
    fn set_outputs(&self, _factory: &StageFactory, _outputs: &StageOutputs, _published: &mut Outputs) -> Result<()> {
        Ok(())
    }

    /// Side effects after the apply, with this stage's outputs already recorded.
    async fn post_deploy(&self, _factory: &StageFactory, _outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        Ok(())
    }

    async fn check(&self, _factory: &StageFactory, _outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        Ok(())
    }

    /// Variables this stage hands to every later tool invocation.
    fn env_layer(&self, _factory: &StageFactory, _outputs: &StageOutputs) -> Result<ExecEnv> {
        Ok(ExecEnv::new())
    }
}

pub struct TerraformStage<B> {
    factory: StageFactory,
    body: B,
}

impl<B: TerraformStageBody> TerraformStage<B> {
    pub fn new(factory: &StageFactory, body: B) -> Self {
        Self {
            factory: factory.clone(),
            body,
        }
    }

    /// Output-relative directory, always `/`-separated.
    pub fn stage_prefix(&self) -> String {
        if self.body.per_provider() {
            format!("stages/{}/{}", B::NAME, self.factory.config.provider)
        } else {
            format!("stages/{}", B::NAME)
        }
    }

    fn directory(&self) -> PathBuf {
        self.factory.output_directory.join(self.stage_prefix())
    }

    fn template_source(&self) -> String {
        if self.body.per_provider() {
            format!("{}/{}", B::NAME, self.factory.config.provider)
        } else {
            B::NAME.to_string()
        }
    }

    fn scope(&self, outputs: &StageOutputs) -> Result<StageScope> {
        let layer = self.body.env_layer(&self.factory, outputs)?;
        Ok(StageScope::with_env(B::NAME, layer))
    }
}

#[async_trait]
impl<B: TerraformStageBody> Stage for TerraformStage<B> {
    fn name(&self) -> &str {
        B::NAME
    }

    fn priority(&self) -> i32 {
        B::PRIORITY
    }

    fn input_schema(&self) -> &'static [&'static str] {
        self.body.input_schema()
    }

    fn output_schema(&self) -> &'static [&'static str] {
        self.body.output_schema()
    }

    fn depends_on(&self) -> &'static [&'static str] {
        self.body.depends_on()
    }

    fn render(&self) -> Result<RenderedFiles> {
        let prefix = self.stage_prefix();
        let mut files = template_files(
            self.factory.template_root.as_deref(),
            &self.template_source(),
            &prefix,
        )?;
        let objects = self.body.tf_objects(&self.factory)?;
        files.insert(
            format!("{}/{}", prefix, TF_OBJECTS_FILENAME),
            FileContent::Text(render_objects(&objects)?),
        );
        Ok(files)
    }

    async fn deploy(&self, outputs: &mut StageOutputs, env: &ExecEnv) -> Result<StageScope> {
        let request = DeployRequest::apply(self.directory(), self.body.input_vars(&self.factory, outputs)?)
            .with_imports(self.body.state_imports(&self.factory)?);

        let mut published = nebari_tofu::deploy(self.factory.engine.as_ref(), &request, env).await?;
        self.body.set_outputs(&self.factory, outputs, &mut published)?;
        outputs.insert(B::NAME, published)?;

        let scope = self.scope(outputs)?;
        let env = ExecEnv::merged([env, scope.env()]);
        self.body.post_deploy(&self.factory, outputs, &env).await?;
        Ok(scope)
    }

    async fn check(&self, outputs: &StageOutputs, env: &ExecEnv) -> Result<()> {
        self.body.check(&self.factory, outputs, env).await
    }

    async fn destroy(&self, outputs: &mut StageOutputs, env: &ExecEnv) -> Result<StageScope> {
        let request = DeployRequest {
            tofu_apply: false,
            ..DeployRequest::apply(self.directory(), self.body.input_vars(&self.factory, outputs)?)
        }
        .with_imports(self.body.state_imports(&self.factory)?);

        let mut published = nebari_tofu::deploy(self.factory.engine.as_ref(), &request, env).await?;
        // a half-destroyed stage may lack what the derived outputs are built from
        if let Err(e) = self.body.set_outputs(&self.factory, outputs, &mut published) {
            tracing::warn!(stage = B::NAME, "could not derive outputs: {}", e);
        }
        outputs.insert(B::NAME, published)?;
        self.scope(outputs)
    }

    async fn teardown(&self, outputs: &StageOutputs, env: &ExecEnv) -> Result<()> {
        let request = DeployRequest::destroy(self.directory(), self.body.input_vars(&self.factory, outputs)?);
        nebari_tofu::deploy(self.factory.engine.as_ref(), &request, env).await?;
        Ok(())
    }
}
