//! Object storage upload client
//!
//! Uploads item payloads to one blob container over the storage REST API,
//! authenticated with a container SAS token. Each local file becomes a block
//! blob named after its file name, with a fixed content type. Existing blobs
//! are overwritten.
//!
//! Container creation happens once at startup; an already-existing container
//! is fatal for the upload pathway ([`IngestError::ContainerExists`]).

use crate::config::BlobSettings;
use crate::error::{IngestError, IngestResult};
use crate::services::remote_caller::RemoteCaller;
use crate::types::{CallOutcome, FailureReason, WorkItem};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::path::Path;

const STORAGE_API_VERSION: &str = "2021-08-06";
const USER_AGENT: &str = concat!("pixvec-ingest/", env!("CARGO_PKG_VERSION"));

/// Result of one successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub blob_name: String,
    /// Blob URL without the SAS query
    pub url: String,
    pub bytes: u64,
}

/// Blob container API client
pub struct BlobContainerClient {
    http_client: reqwest::Client,
    container_url: Url,
    container: String,
    sas_token: String,
    content_type: String,
}

impl BlobContainerClient {
    pub fn new(settings: BlobSettings) -> IngestResult<Self> {
        let mut container_url = Url::parse(&settings.account_url).map_err(|e| {
            IngestError::Startup(format!(
                "Invalid blob account URL {}: {}",
                settings.account_url, e
            ))
        })?;
        container_url
            .path_segments_mut()
            .map_err(|_| {
                IngestError::Startup(format!(
                    "Blob account URL {} cannot be a base URL",
                    settings.account_url
                ))
            })?
            .pop_if_empty()
            .push(&settings.container);

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| IngestError::Startup(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            container_url,
            container: settings.container,
            sas_token: settings.sas_token,
            content_type: settings.content_type,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Public URL of a blob in this container
    pub fn blob_url(&self, blob_name: &str) -> Url {
        let mut url = self.container_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(blob_name);
        }
        url
    }

    fn signed(&self, mut url: Url, extra_query: Option<&str>) -> Url {
        let query = match extra_query {
            Some(extra) => format!("{}&{}", extra, self.sas_token),
            None => self.sas_token.clone(),
        };
        url.set_query(Some(&query));
        url
    }

    /// Create the container with public read access for blobs
    pub async fn create_container(&self) -> IngestResult<()> {
        let url = self.signed(self.container_url.clone(), Some("restype=container"));

        let response = self
            .http_client
            .put(url)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-blob-public-access", "blob")
            .body(Vec::<u8>::new())
            .send()
            .await
            .map_err(|e| {
                IngestError::Startup(format!(
                    "Container {} could not be created: {}",
                    self.container, e
                ))
            })?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(container = %self.container, "Created blob container");
                Ok(())
            }
            StatusCode::CONFLICT => Err(IngestError::ContainerExists(self.container.clone())),
            status => Err(IngestError::Startup(format!(
                "Container {} could not be created. Error code: {}",
                self.container,
                status.as_u16()
            ))),
        }
    }

    /// Upload one local file as a block blob named after the file
    pub async fn upload_file(&self, path: &Path) -> Result<UploadReceipt, FailureReason> {
        let blob_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FailureReason::TransportError(format!("{} has no file name", path.display()))
            })?;

        let data = tokio::fs::read(path).await.map_err(|e| {
            FailureReason::TransportError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let bytes = data.len() as u64;

        let public_url = self.blob_url(&blob_name);
        let response = self
            .http_client
            .put(self.signed(public_url.clone(), None))
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, &self.content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| FailureReason::TransportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FailureReason::NonSuccessStatus(status.as_u16()));
        }

        Ok(UploadReceipt {
            blob_name,
            url: public_url.to_string(),
            bytes,
        })
    }
}

#[async_trait]
impl RemoteCaller for BlobContainerClient {
    type Output = UploadReceipt;

    fn name(&self) -> &'static str {
        "blob-upload"
    }

    async fn call(&self, item: &WorkItem) -> CallOutcome<UploadReceipt> {
        match self.upload_file(Path::new(item.locator())).await {
            Ok(receipt) => CallOutcome::success(item, receipt),
            Err(reason) => CallOutcome::failure(item, reason),
        }
    }
}
