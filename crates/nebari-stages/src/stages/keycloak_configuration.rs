//! `06-kubernetes-keycloak-configuration`: the `nebari` realm, its groups and login flow.

use super::{KEYCLOAK_CONFIGURATION, KUBERNETES_KEYCLOAK, realm_id};
use crate::checks::readiness_policy;
use crate::keycloak::{KeycloakAdmin, KeycloakCredentials};
use crate::terraform::TerraformStageBody;
use async_trait::async_trait;
use nebari_core::{NebariError, Result, StageFactory, StageOutputs};
use nebari_tofu::ExecEnv;
use serde_json::{Map, Value, json};

pub const NEBARI_REALM: &str = "nebari";

const BUILTIN_GROUPS: [&str; 4] = ["superadmin", "admin", "developer", "analyst"];
const SHARED_USERS_GROUP: &str = "users";

pub struct KeycloakConfiguration;

#[async_trait]
impl TerraformStageBody for KeycloakConfiguration {
    const NAME: &'static str = KEYCLOAK_CONFIGURATION;
    const PRIORITY: i32 = 60;

    fn input_schema(&self) -> &'static [&'static str] {
        &["security"]
    }

    fn output_schema(&self) -> &'static [&'static str] {
        &["realm_id"]
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[KUBERNETES_KEYCLOAK]
    }

    fn input_vars(&self, factory: &StageFactory, _outputs: &StageOutputs) -> Result<Map<String, Value>> {
        let security = &factory.config.security;
        let users: &[&str] = if security.shared_users_group {
            &[SHARED_USERS_GROUP]
        } else {
            &[]
        };
        let keycloak_groups: Vec<&str> = BUILTIN_GROUPS.iter().chain(users).copied().collect();
        let default_groups: Vec<&str> = ["analyst"].iter().chain(users).copied().collect();

        let mut vars = Map::new();
        vars.insert("realm".into(), json!(NEBARI_REALM));
        vars.insert(
            "realm_display_name".into(),
            json!(security.keycloak.realm_display_name),
        );
        vars.insert("authentication".into(), security.authentication.clone());
        vars.insert("keycloak_groups".into(), json!(keycloak_groups));
        vars.insert("default_groups".into(), json!(default_groups));
        Ok(vars)
    }

    async fn check(&self, _factory: &StageFactory, outputs: &StageOutputs, _env: &ExecEnv) -> Result<()> {
        let credentials = KeycloakCredentials::from_outputs(outputs, KUBERNETES_KEYCLOAK)?;
        let realm = realm_id(outputs)?;

        readiness_policy()
            .retry(&format!("keycloak realm {}", realm), |attempt| {
                let credentials = &credentials;
                let realm = &realm;
                async move {
                    let admin = KeycloakAdmin::login(credentials).await?;
                    if admin.realm_ids().await?.iter().any(|id| id == realm) {
                        return Ok(());
                    }
                    tracing::debug!(attempt, "connected to keycloak but realm={} does not exist yet", realm);
                    Err(NebariError::Stage(format!("realm {} does not exist", realm)))
                }
            })
            .await
            .map_err(|e| {
                NebariError::check(
                    KEYCLOAK_CONFIGURATION,
                    format!("unable to ensure that realm {} exists: {}", realm, e),
                )
            })?;

        tracing::info!(stage = KEYCLOAK_CONFIGURATION, realm = %realm, "keycloak realm available");
        Ok(())
    }
}
