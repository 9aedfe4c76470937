//! Shared types used by the LRO client, the HTTP transport and the batch runner.

use crate::analyzer::payload::ResultPayload;
use crate::auth::AuthError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while driving analyzer operations.
#[derive(Debug, Error)]
pub enum LroError {
    /// Endpoint failed to parse or normalize.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Service responded with a non-success status code.
    #[error("Unexpected service response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A successful submit response did not say where to poll.
    #[error("Service accepted the request but returned no Operation-Location header")]
    MissingOperationLocation,
    /// Response body could not be interpreted.
    #[error("Malformed service response: {0}")]
    InvalidResponse(String),
    /// No credential could be attached to the request.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// Local content could not be read for upload.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The service reported a terminal failure for the operation.
    #[error("Operation failed: {detail}")]
    OperationFailed {
        /// Error detail reported by the service.
        detail: String,
    },
    /// The operation did not reach a terminal state within the polling budget.
    #[error("Operation did not finish after {attempts} status checks ({elapsed:?})")]
    Timeout {
        /// Number of status requests issued.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
}

impl LroError {
    /// Whether this error came from issuing a request rather than from the operation itself.
    pub fn is_request_error(&self) -> bool {
        !matches!(
            self,
            Self::OperationFailed { .. } | Self::Timeout { .. }
        )
    }

    /// HTTP status attached to the error, when the service answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport(error) => error.status(),
            _ => None,
        }
    }
}

/// Opaque reference to a remote operation, usually the URL to poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(String);

impl OperationHandle {
    /// Wrap a raw `Operation-Location` value.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Raw handle value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    /// Accepted but not yet picked up.
    NotStarted,
    /// Work in progress.
    Running,
    /// Finished with a result payload.
    Succeeded,
    /// Finished with an error detail.
    Failed,
}

impl OperationStatus {
    /// `Succeeded` and `Failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    /// Apply an observed status, ignoring backward moves and anything after a terminal state.
    pub fn advance(self, observed: Self) -> Self {
        if self.is_terminal() || observed.rank() < self.rank() {
            if observed != self {
                tracing::debug!(current = ?self, observed = ?observed, "Ignoring status regression");
            }
            self
        } else {
            observed
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "notstarted" | "not_started" => Ok(Self::NotStarted),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown operation status '{other}'")),
        }
    }
}

/// One in-flight or completed remote job.
#[derive(Debug, Clone)]
pub struct Operation {
    analyzer_id: String,
    handle: OperationHandle,
    status: OperationStatus,
    result: Option<ResultPayload>,
    failure: Option<String>,
}

impl Operation {
    /// Track a freshly submitted operation.
    pub fn new(analyzer_id: impl Into<String>, handle: OperationHandle) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            handle,
            status: OperationStatus::NotStarted,
            result: None,
            failure: None,
        }
    }

    /// Analyzer the operation was submitted against.
    pub fn analyzer_id(&self) -> &str {
        &self.analyzer_id
    }

    /// Handle used to poll the operation.
    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    /// Latest observed status.
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Result payload, present once the operation succeeded.
    pub fn result(&self) -> Option<&ResultPayload> {
        self.result.as_ref()
    }

    /// Failure detail, present once the operation failed.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn observe(&mut self, status: OperationStatus) {
        self.status = self.status.advance(status);
    }

    pub(crate) fn succeed(&mut self, payload: ResultPayload) {
        self.observe(OperationStatus::Succeeded);
        self.result = Some(payload);
    }

    pub(crate) fn fail(&mut self, detail: String) {
        self.observe(OperationStatus::Failed);
        self.failure = Some(detail);
    }
}

/// Schema descriptor used to create an analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerTemplate(Value);

impl AnalyzerTemplate {
    /// Wrap an in-memory template definition.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Read a JSON template from disk.
    pub fn from_path(path: &Path) -> Result<Self, LroError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LroError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value = serde_json::from_str(&raw).map_err(|error| {
            LroError::InvalidResponse(format!(
                "template {} is not valid JSON: {error}",
                path.display()
            ))
        })?;
        Ok(Self(value))
    }

    /// Template body sent to the service.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Where the content to analyze lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentLocator {
    /// Publicly reachable URL fetched by the service.
    Url(String),
    /// Local file uploaded as the request body.
    File(PathBuf),
}

impl ContentLocator {
    /// Classify a user-supplied location as URL or local path.
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }
}

impl std::fmt::Display for ContentLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Request issued by `submit`.
#[derive(Debug, Clone)]
pub enum SubmitRequest {
    /// Create (or replace) an analyzer from a template.
    CreateAnalyzer(AnalyzerTemplate),
    /// Analyze content with an existing analyzer.
    Analyze(ContentLocator),
}

/// Immutable description of one analyzer run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    id: String,
    template: AnalyzerTemplate,
    content: ContentLocator,
}

impl AnalyzerConfig {
    /// Bundle an analyzer id, its template and the content to analyze.
    pub fn new(id: impl Into<String>, template: AnalyzerTemplate, content: ContentLocator) -> Self {
        Self {
            id: id.into(),
            template,
            content,
        }
    }

    /// Analyzer identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Template the analyzer is created from.
    pub fn template(&self) -> &AnalyzerTemplate {
        &self.template
    }

    /// Content the analyzer runs on.
    pub fn content(&self) -> &ContentLocator {
        &self.content
    }
}

/// One decoded status response.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationSnapshot {
    /// Raw status string reported by the service.
    pub status: String,
    /// Result attached to a succeeded operation.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error attached to a failed operation.
    #[serde(default)]
    pub error: Option<Value>,
}

impl OperationSnapshot {
    /// Parse the reported status.
    pub fn parsed_status(&self) -> Result<OperationStatus, LroError> {
        self.status.parse().map_err(LroError::InvalidResponse)
    }

    /// Human readable failure detail.
    pub fn failure_detail(&self) -> String {
        let Some(error) = &self.error else {
            return "service reported failure without detail".to_string();
        };
        let code = error.get("code").and_then(Value::as_str);
        let message = error.get("message").and_then(Value::as_str);
        match (code, message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.to_string(),
            _ => error.to_string(),
        }
    }
}
