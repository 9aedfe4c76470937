//! Credential acquisition for the content-understanding service.
//!
//! Callers hand a [`TokenProvider`] to the HTTP transport explicitly. The transport asks for a
//! fresh [`Credential`] before every request and drops it once the request has been sent.

use crate::config::{AuthMode, Config};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Errors raised while acquiring credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The selected auth mode has no secret to work with.
    #[error("No credentials configured for {0:?} authentication")]
    MissingCredentials(AuthMode),
    /// The external token command could not be spawned.
    #[error("Failed to run token command: {0}")]
    Io(#[from] std::io::Error),
    /// The external token command ran but did not yield a token.
    #[error("Token command failed: {0}")]
    CommandFailed(String),
}

/// A single credential attached to one outgoing request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Resource subscription key.
    SubscriptionKey(String),
    /// OAuth bearer token.
    Bearer(String),
}

impl Credential {
    /// Attach the credential to an outgoing request.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::SubscriptionKey(key) => request.header(SUBSCRIPTION_KEY_HEADER, key),
            Self::Bearer(token) => request.bearer_auth(token),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubscriptionKey(_) => f.write_str("SubscriptionKey(<redacted>)"),
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Source of credentials for outgoing requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce the credential for the next request.
    async fn credential(&self) -> Result<Credential, AuthError>;
}

/// Provider that always hands out the same credential.
#[derive(Debug, Clone)]
pub struct StaticCredential(Credential);

impl StaticCredential {
    /// Wrap a fixed credential.
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }
}

#[async_trait]
impl TokenProvider for StaticCredential {
    async fn credential(&self) -> Result<Credential, AuthError> {
        Ok(self.0.clone())
    }
}

/// Provider that shells out to `az account get-access-token` for every request.
#[derive(Debug, Clone)]
pub struct AzureCliTokenProvider {
    resource: String,
}

impl AzureCliTokenProvider {
    /// Build a provider that requests tokens scoped to `resource`.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn credential(&self) -> Result<Credential, AuthError> {
        let output = Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--query",
                "accessToken",
                "--output",
                "tsv",
            ])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AuthError::CommandFailed(stderr));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AuthError::CommandFailed(
                "az returned an empty access token".into(),
            ));
        }
        tracing::debug!(resource = %self.resource, "Acquired access token from Azure CLI");
        Ok(Credential::Bearer(token))
    }
}

/// Build the token provider selected by `config`.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn TokenProvider>, AuthError> {
    match config.auth {
        AuthMode::Key => config
            .subscription_key
            .clone()
            .map(|key| {
                Arc::new(StaticCredential::new(Credential::SubscriptionKey(key)))
                    as Arc<dyn TokenProvider>
            })
            .ok_or(AuthError::MissingCredentials(AuthMode::Key)),
        AuthMode::Token => config
            .bearer_token
            .clone()
            .map(|token| {
                Arc::new(StaticCredential::new(Credential::Bearer(token))) as Arc<dyn TokenProvider>
            })
            .ok_or(AuthError::MissingCredentials(AuthMode::Token)),
        AuthMode::AzureCli => Ok(Arc::new(AzureCliTokenProvider::new(
            config.token_resource.clone(),
        ))),
    }
}
