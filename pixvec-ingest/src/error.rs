//! Error types for pixvec-ingest
//!
//! Run-fatal errors only. Per-item remote call failures are not errors here;
//! they travel as [`crate::types::FailureReason`] inside a
//! [`crate::types::CallOutcome`] and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal ingest error
#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or invalid configuration, detected before any work begins
    #[error("Startup error: {0}")]
    Startup(String),

    /// Input file does not match the expected schema
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Target container already exists (upload pathway startup condition)
    #[error("A container with name {0} already exists")]
    ContainerExists(String),

    /// Intermediate store or output file cannot be written
    #[error("Sink IO error on {path}: {source}")]
    SinkIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delimited file encode/decode error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// pixvec-common error
    #[error("Common error: {0}")]
    Common(#[from] pixvec_common::Error),
}

impl IngestError {
    pub fn sink_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SinkIo {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised before any item was attempted
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Startup(_) | Self::MalformedInput(_) | Self::ContainerExists(_) | Self::Common(_)
        )
    }
}

/// Result type for ingest operations
pub type IngestResult<T> = Result<T, IngestError>;
