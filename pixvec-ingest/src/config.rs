//! Runtime settings resolution for pixvec-ingest
//!
//! Turns the bootstrap [`TomlConfig`] plus environment overrides into the
//! validated, explicit settings values handed to callers and the worker pool
//! at construction. Credentials resolve ENV → TOML; anything missing is a
//! startup error raised before any item is attempted.

use crate::error::{IngestError, IngestResult};
use pixvec_common::config::{resolve_secret, PipelineConfig, TomlConfig};
use std::num::NonZeroU32;
use std::time::Duration;

pub const ENV_VISION_ENDPOINT: &str = "PIXVEC_VISION_ENDPOINT";
pub const ENV_VISION_KEY: &str = "PIXVEC_VISION_KEY";
pub const ENV_BLOB_ACCOUNT_URL: &str = "PIXVEC_BLOB_ACCOUNT_URL";
pub const ENV_BLOB_CONTAINER: &str = "PIXVEC_BLOB_CONTAINER";
pub const ENV_BLOB_SAS_TOKEN: &str = "PIXVEC_BLOB_SAS_TOKEN";

/// Batching and concurrency limits for [`crate::workflow::BatchedWorkerPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub call_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            concurrency: 4,
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolSettings {
    pub fn from_config(pipeline: &PipelineConfig) -> IngestResult<Self> {
        if pipeline.batch_size == 0 {
            return Err(IngestError::Startup("batch_size must be at least 1".into()));
        }
        if pipeline.concurrency == 0 {
            return Err(IngestError::Startup("concurrency must be at least 1".into()));
        }
        if pipeline.call_timeout_secs == 0 {
            return Err(IngestError::Startup(
                "call_timeout_secs must be at least 1".into(),
            ));
        }

        Ok(Self {
            batch_size: pipeline.batch_size,
            concurrency: pipeline.concurrency,
            call_timeout: Duration::from_secs(pipeline.call_timeout_secs),
        })
    }
}

/// Embedding service connection settings
#[derive(Debug, Clone)]
pub struct VisionSettings {
    /// Base endpoint, always ending with `/`
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub model_version: String,
    pub requests_per_second: Option<NonZeroU32>,
    /// HTTP client timeout (mirrors the per-call pool timeout)
    pub timeout: Duration,
}

impl VisionSettings {
    /// Resolve from TOML + ENV
    pub fn resolve(config: &TomlConfig) -> IngestResult<Self> {
        let vision = config.vision.clone().unwrap_or_default();

        let endpoint = resolve_secret(
            ENV_VISION_ENDPOINT,
            vision.endpoint.as_deref(),
            "Vision endpoint",
        )
        .ok_or_else(|| {
            IngestError::Startup(format!(
                "Vision endpoint not configured. Set {} or [vision] endpoint",
                ENV_VISION_ENDPOINT
            ))
        })?;

        let api_key = resolve_secret(ENV_VISION_KEY, vision.api_key.as_deref(), "Vision API key")
            .ok_or_else(|| {
                IngestError::Startup(format!(
                    "Vision API key not configured. Set {} or [vision] api_key",
                    ENV_VISION_KEY
                ))
            })?;

        let requests_per_second = match vision.requests_per_second {
            None => None,
            Some(n) => Some(NonZeroU32::new(n).ok_or_else(|| {
                IngestError::Startup("requests_per_second must be at least 1".into())
            })?),
        };

        Ok(Self {
            endpoint: with_trailing_slash(endpoint),
            api_key,
            api_version: vision.api_version,
            model_version: vision.model_version,
            requests_per_second,
            timeout: Duration::from_secs(config.pipeline.call_timeout_secs.max(1)),
        })
    }
}

/// Object storage destination settings
#[derive(Debug, Clone)]
pub struct BlobSettings {
    /// Account URL without trailing `/`
    pub account_url: String,
    pub container: String,
    /// SAS query string without leading `?`
    pub sas_token: String,
    pub content_type: String,
    pub timeout: Duration,
}

impl BlobSettings {
    /// Resolve from TOML + ENV
    pub fn resolve(config: &TomlConfig) -> IngestResult<Self> {
        let blob = config.blob.clone().unwrap_or_default();

        let account_url = resolve_secret(
            ENV_BLOB_ACCOUNT_URL,
            blob.account_url.as_deref(),
            "Blob account URL",
        )
        .ok_or_else(|| missing("Blob account URL", ENV_BLOB_ACCOUNT_URL, "account_url"))?;

        let container = resolve_secret(
            ENV_BLOB_CONTAINER,
            blob.container.as_deref(),
            "Blob container name",
        )
        .ok_or_else(|| missing("Blob container name", ENV_BLOB_CONTAINER, "container"))?;

        let sas_token = resolve_secret(
            ENV_BLOB_SAS_TOKEN,
            blob.sas_token.as_deref(),
            "Blob SAS token",
        )
        .ok_or_else(|| missing("Blob SAS token", ENV_BLOB_SAS_TOKEN, "sas_token"))?;

        Ok(Self {
            account_url: account_url.trim_end_matches('/').to_string(),
            container,
            sas_token: sas_token.trim_start_matches('?').to_string(),
            content_type: blob.content_type,
            timeout: Duration::from_secs(config.pipeline.call_timeout_secs.max(1)),
        })
    }
}

/// Field delimiter as the single byte the csv reader/writer expects
pub fn delimiter_byte(delimiter: char) -> IngestResult<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(IngestError::Startup(format!(
            "Delimiter {:?} is not a single ASCII character",
            delimiter
        )))
    }
}

fn missing(label: &str, env_var: &str, toml_key: &str) -> IngestError {
    IngestError::Startup(format!(
        "{} not configured. Set {} or [blob] {}",
        label, env_var, toml_key
    ))
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}
