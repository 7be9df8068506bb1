//! Batched remote-call workflow
//!
//! ItemSource → [`BatchedWorkerPool`] (→ RemoteCaller × concurrency) →
//! [`OutcomeSink`] per batch → [`DatasetReconciler`] once at the end.
//!
//! - [`worker_pool`]: batching, bounded concurrency, order restoration
//! - [`sink`]: per-batch persistence of successful outcomes
//! - [`reconciler`]: inner join of dataset and intermediate store
//! - [`pipeline`]: the embedding and upload pathways wired end to end

pub mod pipeline;
pub mod reconciler;
pub mod sink;
pub mod worker_pool;

pub use pipeline::{DatasetPaths, EmbeddingPipeline, EmbeddingRunReport, UploadPipeline};
pub use reconciler::{DatasetReconciler, ReconcileReport};
pub use sink::{DiscardSink, IncrementalSink, OutcomeSink};
pub use worker_pool::BatchedWorkerPool;
