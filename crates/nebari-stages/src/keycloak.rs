//! Minimal Keycloak admin client: password login and realm listing.

use crate::checks::insecure_client;
use nebari_core::{NebariError, Result, StageOutputs};
use nebari_tofu::ExecEnv;
use serde::Deserialize;

/// Root credentials published by the keycloak stage as `keycloak_credentials`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeycloakCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    pub realm: String,
    pub client_id: String,
}

impl KeycloakCredentials {
    pub fn from_outputs(outputs: &StageOutputs, stage: &str) -> Result<Self> {
        let value = outputs.value(stage, "keycloak_credentials")?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// `KEYCLOAK_*` variables read by the keycloak terraform provider.
    pub fn env_layer(&self) -> ExecEnv {
        ExecEnv::new()
            .with("KEYCLOAK_CLIENT_ID", &self.client_id)
            .with("KEYCLOAK_URL", &self.url)
            .with("KEYCLOAK_USER", &self.username)
            .with("KEYCLOAK_PASSWORD", &self.password)
            .with("KEYCLOAK_REALM", &self.realm)
    }

    /// Base under which Keycloak serves its API.
    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.url.trim_end_matches('/'))
    }
}

pub struct KeycloakAdmin {
    client: reqwest::Client,
    auth_url: String,
    token: String,
}

impl KeycloakAdmin {
    /// Logs into the credentials' realm with the password grant.
    pub async fn login(credentials: &KeycloakCredentials) -> Result<Self> {
        let client = insecure_client()?;
        let auth_url = credentials.auth_url();
        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            auth_url, credentials.realm
        );

        let response = client
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", credentials.client_id.as_str()),
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| keycloak_error("login", e))?;

        if !response.status().is_success() {
            return Err(NebariError::Stage(format!(
                "keycloak login to realm {} failed with {}",
                credentials.realm,
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| keycloak_error("login", e))?;
        Ok(Self {
            client,
            auth_url,
            token: token.access_token,
        })
    }

    /// Ids of every realm visible to the logged in user.
    pub async fn realm_ids(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/admin/realms", self.auth_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| keycloak_error("list realms", e))?;

        if !response.status().is_success() {
            return Err(NebariError::Stage(format!(
                "keycloak realm listing failed with {}",
                response.status()
            )));
        }

        let realms: Vec<Realm> = response
            .json()
            .await
            .map_err(|e| keycloak_error("list realms", e))?;
        Ok(realms.into_iter().map(|r| r.id).collect())
    }
}

fn keycloak_error(action: &str, e: reqwest::Error) -> NebariError {
    NebariError::Stage(format!("keycloak {} failed: {}", action, e))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Realm {
    id: String,
}
