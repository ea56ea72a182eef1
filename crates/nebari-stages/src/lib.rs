//! Nebari built-in stages
//!
//! The default pipeline from repository bootstrap to user extensions, plus
//! the pieces those stages share: provider and backend blocks, credential
//! checks, CI/CD file generation and readiness probes.
//!
//! | stage | priority |
//! |---|---|
//! | `bootstrap` | 0 |
//! | `01-terraform-state` | 10 |
//! | `02-infrastructure` | 20 |
//! | `03-kubernetes-initialize` | 30 |
//! | `04-kubernetes-ingress` | 40 |
//! | `05-kubernetes-keycloak` | 50 |
//! | `06-kubernetes-keycloak-configuration` | 60 |
//! | `07-kubernetes-services` | 70 |
//! | `08-nebari-tf-extensions` | 80 |

pub mod checks;
pub mod cicd;
pub mod credentials;
pub mod keycloak;
pub mod kubectl;
pub mod stages;
pub mod summary;
pub mod templates;
pub mod terraform;
pub mod tf_objects;

#[cfg(test)]
pub(crate) mod testing;

use kubectl::Kubectl;
use nebari_core::{Stage, StageFactory, StageProvider};
use stages::bootstrap::BootstrapStage;
use stages::infrastructure::Infrastructure;
use stages::keycloak_configuration::KeycloakConfiguration;
use stages::kubernetes_ingress::KubernetesIngress;
use stages::kubernetes_initialize::KubernetesInitialize;
use stages::kubernetes_keycloak::KubernetesKeycloak;
use stages::kubernetes_services::KubernetesServices;
use stages::terraform_state::TerraformState;
use stages::tf_extensions::TfExtensions;
use terraform::TerraformStage;

// Re-exports
pub use credentials::{check_cloud_credentials, required_variables};
pub use summary::DeploySummary;
pub use templates::TEMPLATE_DIR_ENV;

/// Every built-in stage, in pipeline order.
pub fn builtin_stages(factory: &StageFactory) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(BootstrapStage::new(factory)),
        Box::new(TerraformStage::new(factory, TerraformState)),
        Box::new(TerraformStage::new(factory, Infrastructure::new(Kubectl::from_env()))),
        Box::new(TerraformStage::new(factory, KubernetesInitialize::new(Kubectl::from_env()))),
        Box::new(TerraformStage::new(factory, KubernetesIngress)),
        Box::new(TerraformStage::new(factory, KubernetesKeycloak::new(&factory.config))),
        Box::new(TerraformStage::new(factory, KeycloakConfiguration)),
        Box::new(TerraformStage::new(factory, KubernetesServices)),
        Box::new(TerraformStage::new(factory, TfExtensions)),
    ]
}

/// The default provider registered by the CLI.
pub struct BuiltinStages;

impl StageProvider for BuiltinStages {
    fn name(&self) -> &str {
        "builtin"
    }

    fn is_default(&self) -> bool {
        true
    }

    fn stages(&self, factory: &StageFactory) -> Vec<Box<dyn Stage>> {
        builtin_stages(factory)
    }
}
