//! pixvec-ingest library interface
//!
//! Batch embedding of an image dataset through a remote vision service and
//! upload of the images to object storage. The binary in `main.rs` is a thin
//! CLI over [`workflow::EmbeddingPipeline`] and [`workflow::UploadPipeline`].

pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::error::{IngestError, IngestResult};
pub use crate::types::{CallOutcome, Embedding, FailureReason, RunSummary, WorkItem};
