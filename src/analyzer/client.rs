//! HTTP transport for the content-understanding REST API.

use crate::analyzer::lro::AnalyzerTransport;
use crate::analyzer::types::{
    AnalyzerTemplate, ContentLocator, LroError, OperationHandle, OperationSnapshot, SubmitRequest,
};
use crate::auth::TokenProvider;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

const OPERATION_LOCATION: &str = "operation-location";
const USER_AGENT_HEADER: &str = "x-ms-useragent";

/// Lightweight HTTP client for analyzer operations.
pub struct ContentUnderstandingClient {
    pub(crate) client: Client,
    pub(crate) endpoint: String,
    pub(crate) api_version: String,
    pub(crate) user_agent: String,
    pub(crate) credentials: Arc<dyn TokenProvider>,
}

impl ContentUnderstandingClient {
    /// Construct a client for `config`, authenticating every request through `credentials`.
    pub fn new(config: &Config, credentials: Arc<dyn TokenProvider>) -> Result<Self, LroError> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .user_agent("content-lro/0.1")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        let endpoint = normalize_base_url(&config.endpoint).map_err(LroError::InvalidUrl)?;
        tracing::debug!(
            endpoint = %endpoint,
            api_version = %config.api_version,
            auth = ?config.auth,
            ?timeout,
            "Initialized content-understanding HTTP client"
        );

        Ok(Self {
            client,
            endpoint,
            api_version: config.api_version.clone(),
            user_agent: config.user_agent.clone(),
            credentials,
        })
    }

    /// List the analyzers defined on the resource.
    pub async fn list_analyzers(&self) -> Result<Vec<Value>, LroError> {
        let response = self.request(Method::GET, "analyzers").await?.send().await?;
        let response = ensure_success(response, "list analyzers").await?;
        let listing: AnalyzerListing = response.json().await?;
        Ok(listing.value)
    }

    /// Fetch the definition of one analyzer.
    pub async fn get_analyzer(&self, analyzer_id: &str) -> Result<Value, LroError> {
        let response = self
            .request(Method::GET, &analyzer_path(analyzer_id))
            .await?
            .send()
            .await?;
        let response = ensure_success(response, "get analyzer").await?;
        Ok(response.json().await?)
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, LroError> {
        let url = format!(
            "{}/contentunderstanding/{}",
            self.endpoint,
            path.trim_start_matches('/')
        );
        let req = self
            .client
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())]);
        self.authorize(req).await
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder, LroError> {
        let credential = self.credentials.credential().await?;
        Ok(credential
            .apply(req)
            .header(USER_AGENT_HEADER, &self.user_agent))
    }

    async fn create_analyzer(
        &self,
        analyzer_id: &str,
        template: &AnalyzerTemplate,
    ) -> Result<Response, LroError> {
        Ok(self
            .request(Method::PUT, &analyzer_path(analyzer_id))
            .await?
            .json(template.as_value())
            .send()
            .await?)
    }

    async fn analyze(
        &self,
        analyzer_id: &str,
        content: &ContentLocator,
    ) -> Result<Response, LroError> {
        let req = self
            .request(Method::POST, &format!("{}:analyze", analyzer_path(analyzer_id)))
            .await?;
        let req = match content {
            ContentLocator::Url(url) => req.json(&json!({ "url": url })),
            ContentLocator::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|source| LroError::Io {
                    path: path.clone(),
                    source,
                })?;
                req.header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes)
            }
        };
        Ok(req.send().await?)
    }
}

#[async_trait]
impl AnalyzerTransport for ContentUnderstandingClient {
    async fn submit(
        &self,
        analyzer_id: &str,
        request: &SubmitRequest,
    ) -> Result<OperationHandle, LroError> {
        let (response, action) = match request {
            SubmitRequest::CreateAnalyzer(template) => (
                self.create_analyzer(analyzer_id, template).await?,
                "create analyzer",
            ),
            SubmitRequest::Analyze(content) => {
                tracing::debug!(analyzer = analyzer_id, content = %content, "Submitting content");
                (self.analyze(analyzer_id, content).await?, "analyze")
            }
        };

        let response = ensure_success(response, action).await?;
        operation_location(response.headers())
    }

    async fn fetch(&self, handle: &OperationHandle) -> Result<OperationSnapshot, LroError> {
        let req = self.client.get(handle.as_str());
        let response = self.authorize(req).await?.send().await?;
        let response = ensure_success(response, "poll operation").await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|error| {
            LroError::InvalidResponse(format!("failed to decode operation status: {error}"))
        })
    }

    async fn delete(&self, analyzer_id: &str) -> Result<(), LroError> {
        let response = self
            .request(Method::DELETE, &analyzer_path(analyzer_id))
            .await?
            .send()
            .await?;
        ensure_success(response, "delete analyzer").await.map(drop)
    }
}

#[derive(Deserialize)]
struct AnalyzerListing {
    #[serde(default)]
    value: Vec<Value>,
}

fn analyzer_path(analyzer_id: &str) -> String {
    format!("analyzers/{analyzer_id}")
}

fn operation_location(headers: &HeaderMap) -> Result<OperationHandle, LroError> {
    headers
        .get(OPERATION_LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(OperationHandle::new)
        .ok_or(LroError::MissingOperationLocation)
}

async fn ensure_success(response: Response, action: &str) -> Result<Response, LroError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = LroError::UnexpectedStatus { status, body };
    tracing::error!(action, error = %error, "Content-understanding request failed");
    Err(error)
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|err| err.to_string())?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
