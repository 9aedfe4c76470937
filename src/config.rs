use crate::analyzer::PollPolicy;
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
const DEFAULT_TOKEN_RESOURCE: &str = "https://cognitiveservices.azure.com";
const DEFAULT_USER_AGENT: &str = "content-lro";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the content-understanding client.
///
/// The value is owned by the caller and handed to the transport explicitly; nothing here is
/// cached in process-global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the content-understanding resource.
    pub endpoint: String,
    /// Value sent as the `api-version` query parameter.
    pub api_version: String,
    /// How requests are authenticated.
    pub auth: AuthMode,
    /// Subscription key used when `auth` is [`AuthMode::Key`].
    pub subscription_key: Option<String>,
    /// Static bearer token used when `auth` is [`AuthMode::Token`].
    pub bearer_token: Option<String>,
    /// Resource passed to `az account get-access-token` when `auth` is [`AuthMode::AzureCli`].
    pub token_resource: String,
    /// Tag sent in the `x-ms-useragent` header.
    pub user_agent: String,
    /// Delay between two status requests for the same operation.
    pub poll_interval_secs: u64,
    /// Upper bound on the time spent polling one operation.
    pub poll_timeout_secs: u64,
    /// Upper bound on a single HTTP request, connect included.
    pub request_timeout_secs: u64,
}

/// Supported authentication schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// `Ocp-Apim-Subscription-Key` header.
    Key,
    /// Static `Authorization: Bearer` token.
    Token,
    /// Bearer token acquired from the Azure CLI before each request.
    AzureCli,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let subscription_key = load_env_optional("CONTENT_UNDERSTANDING_KEY");
        let bearer_token = load_env_optional("CONTENT_UNDERSTANDING_TOKEN");
        let auth = match load_env_optional("CONTENT_UNDERSTANDING_AUTH") {
            Some(value) => value.parse().map_err(|()| {
                ConfigError::InvalidValue("CONTENT_UNDERSTANDING_AUTH".to_string())
            })?,
            None => infer_auth_mode(subscription_key.as_deref(), bearer_token.as_deref()),
        };

        match auth {
            AuthMode::Key if subscription_key.is_none() => {
                return Err(ConfigError::MissingVariable(
                    "CONTENT_UNDERSTANDING_KEY".to_string(),
                ));
            }
            AuthMode::Token if bearer_token.is_none() => {
                return Err(ConfigError::MissingVariable(
                    "CONTENT_UNDERSTANDING_TOKEN".to_string(),
                ));
            }
            _ => {}
        }

        let poll_interval_secs = parse_u64_or(
            "CONTENT_UNDERSTANDING_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CONTENT_UNDERSTANDING_POLL_INTERVAL_SECS".to_string(),
            ));
        }

        let request_timeout_secs = parse_u64_or(
            "CONTENT_UNDERSTANDING_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CONTENT_UNDERSTANDING_REQUEST_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(Self {
            endpoint: load_env("CONTENT_UNDERSTANDING_ENDPOINT")?,
            api_version: load_env_optional("CONTENT_UNDERSTANDING_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            auth,
            subscription_key,
            bearer_token,
            token_resource: load_env_optional("CONTENT_UNDERSTANDING_TOKEN_RESOURCE")
                .unwrap_or_else(|| DEFAULT_TOKEN_RESOURCE.to_string()),
            user_agent: load_env_optional("CONTENT_UNDERSTANDING_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            poll_interval_secs,
            poll_timeout_secs: parse_u64_or(
                "CONTENT_UNDERSTANDING_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?,
            request_timeout_secs,
        })
    }

    /// Build a configuration for `endpoint` authenticated with a subscription key.
    pub fn with_key(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            auth: AuthMode::Key,
            subscription_key: Some(key.into()),
            bearer_token: None,
            token_resource: DEFAULT_TOKEN_RESOURCE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Polling cadence derived from the configured interval and timeout.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_timeout_secs),
        )
    }

    /// Per-request timeout handed to the HTTP client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn infer_auth_mode(key: Option<&str>, token: Option<&str>) -> AuthMode {
    if key.is_some() {
        AuthMode::Key
    } else if token.is_some() {
        AuthMode::Token
    } else {
        AuthMode::AzureCli
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64_or(key: &str, default: u64) -> Result<u64, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

impl std::str::FromStr for AuthMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "key" | "subscription-key" => Ok(Self::Key),
            "token" | "bearer" => Ok(Self::Token),
            "azure-cli" | "az" | "cli" => Ok(Self::AzureCli),
            _ => Err(()),
        }
    }
}
