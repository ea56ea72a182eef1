//! Nebari core
//!
//! The staged deployment pipeline: a stage contract, a registry that turns
//! providers into an ordered stage list, the render/diff engine and the
//! deploy/destroy drivers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   nebari CLI                      │
//! │          (deploy / destroy / render)              │
//! └─────────────────┬────────────────────────────────┘
//!                   │
//! ┌─────────────────▼────────────────────────────────┐
//! │                 nebari-core                       │
//! │  ┌────────────────┐   ┌────────────────────────┐ │
//! │  │ StageRegistry  │──▶│ Vec<Box<dyn Stage>>    │ │
//! │  │ (providers)    │   │ sorted by priority     │ │
//! │  └────────────────┘   └───────────┬────────────┘ │
//! │  ┌────────────┐ ┌──────────────┐ ┌▼────────────┐ │
//! │  │ render     │ │ deploy       │ │ destroy     │ │
//! │  │ (diff)     │ │ (ScopeStack) │ │ (unwind)    │ │
//! │  └────────────┘ └──────┬───────┘ └──────┬──────┘ │
//! └────────────────────────┼────────────────┼────────┘
//!                          │                │
//!                  ┌───────▼────────────────▼───────┐
//!                  │  nebari-tofu (InfraEngine)      │
//!                  └─────────────────────────────────┘
//! ```

pub mod deploy;
pub mod destroy;
pub mod error;
pub mod outputs;
pub mod registry;
pub mod render;
pub mod retry;
pub mod scope;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use deploy::{DeployOptions, TERRAFORM_STATE_STAGE, deploy_configuration, deploy_stages};
pub use destroy::{DeploymentStatus, destroy_stages};
pub use error::{NebariError, Result};
pub use outputs::{StageOutputs, stage_key};
pub use registry::{
    RegisteredStage, StageFactory, StageFilter, StageProvider, StageRegistry, into_stages,
};
pub use render::{
    DEPRECATED_FILE_PATHS, RenderDiff, RenderPlan, plan_files, plan_stages, render_files,
};
pub use retry::RetryPolicy;
pub use scope::{ScopeStack, StageScope};
pub use stage::{FileContent, RenderedFiles, Stage};
