//! The built-in pipeline, `bootstrap` through `08-nebari-tf-extensions`.

pub mod bootstrap;
pub mod infrastructure;
pub mod keycloak_configuration;
pub mod kubernetes_initialize;
pub mod kubernetes_ingress;
pub mod kubernetes_keycloak;
pub mod kubernetes_services;
pub mod terraform_state;
pub mod tf_extensions;

use crate::tf_objects::{helm_provider, kubernetes_provider, terraform_state};
use nebari_config::NebariConfig;
use nebari_core::{Result, StageOutputs};
use serde_json::Value;
use std::path::PathBuf;

pub const BOOTSTRAP: &str = "bootstrap";
pub const TERRAFORM_STATE: &str = nebari_core::TERRAFORM_STATE_STAGE;
pub const INFRASTRUCTURE: &str = "02-infrastructure";
pub const KUBERNETES_INITIALIZE: &str = "03-kubernetes-initialize";
pub const KUBERNETES_INGRESS: &str = "04-kubernetes-ingress";
pub const KUBERNETES_KEYCLOAK: &str = "05-kubernetes-keycloak";
pub const KEYCLOAK_CONFIGURATION: &str = "06-kubernetes-keycloak-configuration";
pub const KUBERNETES_SERVICES: &str = "07-kubernetes-services";
pub const TF_EXTENSIONS: &str = "08-nebari-tf-extensions";

/// Remote state plus the kubernetes and helm providers.
fn cluster_objects(stage: &str, config: &NebariConfig) -> Result<Vec<Value>> {
    let mut objects: Vec<Value> = terraform_state(stage, config)?.into_iter().collect();
    objects.push(kubernetes_provider(config)?);
    objects.push(helm_provider(config));
    Ok(objects)
}

fn node_selectors(outputs: &StageOutputs) -> Result<Value> {
    outputs.value(INFRASTRUCTURE, "node_selectors").cloned()
}

fn kubeconfig_path(outputs: &StageOutputs) -> Result<PathBuf> {
    outputs
        .str_value(INFRASTRUCTURE, "kubeconfig_filename")
        .map(PathBuf::from)
}

/// The domain every service is reached under, as published by the ingress stage.
fn ingress_domain(outputs: &StageOutputs) -> Result<String> {
    outputs
        .str_value(KUBERNETES_INGRESS, "domain")
        .map(str::to_string)
}

fn realm_id(outputs: &StageOutputs) -> Result<String> {
    outputs
        .str_value(KEYCLOAK_CONFIGURATION, "realm_id")
        .map(str::to_string)
}
