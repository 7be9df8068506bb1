//! Vision embedding service client
//!
//! Calls the image retrieval API of the vision service:
//! - `retrieval:vectorizeImage` with a binary body (local file)
//! - `retrieval:vectorizeImage` with `{"url": ...}` (remote image)
//! - `retrieval:vectorizeText` with `{"text": ...}`
//!
//! A success is a 2xx JSON body holding a non-empty `vector` array. One
//! attempt per call, no retry; see [`RemoteCaller`].

use crate::config::VisionSettings;
use crate::error::{IngestError, IngestResult};
use crate::services::remote_caller::RemoteCaller;
use crate::types::{CallOutcome, Embedding, FailureReason, WorkItem};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const USER_AGENT: &str = concat!("pixvec-ingest/", env!("CARGO_PKG_VERSION"));

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct VectorizeResponse {
    #[serde(default)]
    vector: Option<Vec<f64>>,
    #[serde(default, rename = "modelVersion")]
    model_version: Option<String>,
}

/// Vision service API client
pub struct VisionClient {
    http_client: reqwest::Client,
    settings: VisionSettings,
    rate_limiter: Option<DirectRateLimiter>,
}

impl VisionClient {
    pub fn new(settings: VisionSettings) -> IngestResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| IngestError::Startup(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = settings
            .requests_per_second
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            http_client,
            settings,
            rate_limiter,
        })
    }

    fn operation_url(&self, operation: &str) -> String {
        format!(
            "{}computervision/retrieval:{}",
            self.settings.endpoint, operation
        )
    }

    /// Wait for the rate limiter, if one is configured
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }

    /// Vectorize a local image file (binary octet-stream body)
    pub async fn vectorize_image_file(&self, path: &Path) -> Result<Embedding, FailureReason> {
        self.until_ready().await;
        self.image_file_request(path).await
    }

    /// Vectorize a remote image by URL
    pub async fn vectorize_image_url(&self, url: &str) -> Result<Embedding, FailureReason> {
        self.until_ready().await;
        self.image_url_request(url).await
    }

    /// Vectorize a text prompt
    pub async fn vectorize_text(&self, text: &str) -> Result<Embedding, FailureReason> {
        self.until_ready().await;
        self.text_request(text).await
    }

    async fn image_file_request(&self, path: &Path) -> Result<Embedding, FailureReason> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            FailureReason::TransportError(format!("failed to read {}: {}", path.display(), e))
        })?;

        let request = self
            .http_client
            .post(self.operation_url("vectorizeImage"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);

        self.send(request).await
    }

    async fn image_url_request(&self, url: &str) -> Result<Embedding, FailureReason> {
        let request = self
            .http_client
            .post(self.operation_url("vectorizeImage"))
            .json(&serde_json::json!({ "url": url }));

        self.send(request).await
    }

    async fn text_request(&self, text: &str) -> Result<Embedding, FailureReason> {
        let request = self
            .http_client
            .post(self.operation_url("vectorizeText"))
            .json(&serde_json::json!({ "text": text }));

        self.send(request).await
    }

    /// Issue the request; no throttling here
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Embedding, FailureReason> {
        let response = request
            .query(&[
                ("api-version", self.settings.api_version.as_str()),
                ("model-version", self.settings.model_version.as_str()),
            ])
            .header(SUBSCRIPTION_KEY_HEADER, &self.settings.api_key)
            .send()
            .await
            .map_err(|e| FailureReason::TransportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FailureReason::NonSuccessStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FailureReason::TransportError(e.to_string()))?;

        let parsed: VectorizeResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "Vectorize response is not the expected JSON");
                return Err(FailureReason::EmptyResult);
            }
        };

        match parsed.vector {
            Some(vector) if !vector.is_empty() => {
                tracing::trace!(
                    dimension = vector.len(),
                    model_version = parsed.model_version.as_deref().unwrap_or("unknown"),
                    "Vectorize call succeeded"
                );
                Ok(vector)
            }
            _ => Err(FailureReason::EmptyResult),
        }
    }
}

/// Which request shape a [`VisionCaller`] issues for each item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorizeMode {
    /// Locator is a local file path; binary body
    LocalFile,
    /// Locator is an image URL
    ImageUrl,
    /// Locator is the text to embed
    Text,
}

/// [`RemoteCaller`] producing one embedding per work item
pub struct VisionCaller {
    client: Arc<VisionClient>,
    mode: VectorizeMode,
}

impl VisionCaller {
    pub fn new(client: Arc<VisionClient>, mode: VectorizeMode) -> Self {
        Self { client, mode }
    }

    pub fn mode(&self) -> VectorizeMode {
        self.mode
    }
}

#[async_trait]
impl RemoteCaller for VisionCaller {
    type Output = Embedding;

    fn name(&self) -> &'static str {
        match self.mode {
            VectorizeMode::LocalFile => "vectorize-image-file",
            VectorizeMode::ImageUrl => "vectorize-image-url",
            VectorizeMode::Text => "vectorize-text",
        }
    }

    async fn ready(&self) {
        self.client.until_ready().await
    }

    /// Throttling happened in `ready`
    async fn call(&self, item: &WorkItem) -> CallOutcome<Embedding> {
        let result = match self.mode {
            VectorizeMode::LocalFile => {
                self.client
                    .image_file_request(Path::new(item.locator()))
                    .await
            }
            VectorizeMode::ImageUrl => self.client.image_url_request(item.locator()).await,
            VectorizeMode::Text => self.client.text_request(item.locator()).await,
        };

        match result {
            Ok(vector) => CallOutcome::success(item, vector),
            Err(reason) => CallOutcome::failure(item, reason),
        }
    }
}
