//! Nebari OpenTofu adapter
//!
//! Thin layer between the stage pipeline and the `tofu` binary.
//!
//! - [`Tofu`]: subprocess wrapper (`init`, `apply`, `destroy`, `output`, `import`)
//! - [`InfraEngine`]: the trait stages depend on, so tests can swap the engine
//! - [`deploy`]: the per-stage init → import → apply/destroy → output sequence
//! - [`objects`]: tf-JSON builders and `deep_merge`
//! - [`ExecEnv`]: explicit environment passed to every invocation

pub mod cli;
pub mod engine;
pub mod env;
pub mod error;
pub mod objects;

pub use cli::{DEFAULT_TOFU_BINARY, IMPORT_TIMEOUT, TOFU_BINARY_ENV, Tofu};
pub use engine::{DeployRequest, InfraEngine, Outputs, StateImport, deploy};
pub use env::ExecEnv;
pub use error::{Result, TofuError};
pub use objects::{deep_merge, merge_all, render_objects};
