//! OAuth2 client-credentials exchange against Azure AD.
//!
//! Implements [`CredentialProvider`] by posting the application's client id and
//! secret to the tenant's token endpoint. Both endpoint generations are supported:
//!
//! - v1 (`/{tenant}/oauth2/token`) asks for the Graph `resource`;
//! - v2 (`/{tenant}/oauth2/v2.0/token`) asks for the `/.default` scope.
//!
//! Tokens are not cached here; wrap the credential in
//! [`msgraph_convert_core::token_cache::CachedCredential`] for reuse.

use async_trait::async_trait;
use msgraph_convert_core::config::{AuthConfig, TokenEndpoint};
use msgraph_convert_core::contract::{AccessToken, CredentialProvider};
use msgraph_convert_core::error::AuthenticationError;
use serde::Deserialize;
use std::time::Duration;

pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: ExpiresIn,
    #[serde(default)]
    token_type: Option<String>,
}

/// v2 returns a number, v1 returns a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Result<u64, AuthenticationError> {
        match self {
            ExpiresIn::Seconds(s) => Ok(*s),
            ExpiresIn::Text(t) => t.trim().parse().map_err(|_| {
                AuthenticationError::MalformedResponse(format!("expires_in is not a number: {t:?}"))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token endpoint for the configured tenant and endpoint generation.
pub fn token_url(config: &AuthConfig) -> String {
    let host = config.authority_host.trim_end_matches('/');
    match config.token_endpoint {
        TokenEndpoint::V1 => format!("{}/{}/oauth2/token", host, config.tenant_id),
        TokenEndpoint::V2 => format!("{}/{}/oauth2/v2.0/token", host, config.tenant_id),
    }
}

pub struct ClientSecretCredential {
    http: reqwest::Client,
    config: AuthConfig,
}

impl ClientSecretCredential {
    pub fn new(config: AuthConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn validate(&self) -> Result<(), AuthenticationError> {
        let required = [
            ("tenant_id", &self.config.tenant_id),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                tracing::error!(field = name, "[AUTH] Credential field missing");
                return Err(AuthenticationError::MissingField(name));
            }
        }
        Ok(())
    }

    fn form(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        match self.config.token_endpoint {
            TokenEndpoint::V1 => params.push(("resource", GRAPH_RESOURCE)),
            TokenEndpoint::V2 => params.push(("scope", GRAPH_DEFAULT_SCOPE)),
        }
        params
    }
}

#[async_trait]
impl CredentialProvider for ClientSecretCredential {
    async fn get_token(&self) -> Result<AccessToken, AuthenticationError> {
        self.validate()?;
        let url = token_url(&self.config);
        tracing::info!(
            tenant_id = %self.config.tenant_id,
            client_id = %self.config.client_id,
            endpoint = ?self.config.token_endpoint,
            "[AUTH] Requesting client-credentials token"
        );

        let response = self
            .http
            .post(&url)
            .form(&self.form())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "[AUTH] Token request failed");
                AuthenticationError::Request(Box::new(e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthenticationError::Request(Box::new(e)))?;

        if !status.is_success() {
            let (error, description) = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(parsed) => (parsed.error, parsed.error_description),
                Err(_) => (body.clone(), None),
            };
            tracing::error!(status = status.as_u16(), error = %error, "[AUTH] Token endpoint rejected credentials");
            return Err(AuthenticationError::Rejected {
                status: status.as_u16(),
                error,
                description,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = ?e, "[AUTH] Could not parse token response");
            AuthenticationError::MalformedResponse(e.to_string())
        })?;
        if let Some(kind) = parsed.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(AuthenticationError::MalformedResponse(format!(
                    "unexpected token_type {kind:?}"
                )));
            }
        }
        let lifetime = Duration::from_secs(parsed.expires_in.seconds()?);
        tracing::info!(expires_in = lifetime.as_secs(), "[AUTH] Token acquired");
        Ok(AccessToken::expiring_in(parsed.access_token, lifetime))
    }
}
