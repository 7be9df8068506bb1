//! End-to-end pathways
//!
//! **Embedding:** dataset → work items → worker pool (vision caller) →
//! intermediate store per batch → reconcile into the final dataset.
//!
//! **Upload:** final dataset → work items (local files) → create container →
//! worker pool (blob client) → nothing persisted besides the blobs.
//!
//! Everything that can fail at startup (dataset unreadable, key column
//! missing, container already present) fails before the first remote call.

use crate::config::PoolSettings;
use crate::error::{IngestError, IngestResult};
use crate::services::blob_client::BlobContainerClient;
use crate::services::item_source::{ItemSource, LocatorStrategy};
use crate::services::remote_caller::RemoteCaller;
use crate::services::vision_client::VectorizeMode;
use crate::types::{Embedding, RunSummary, WorkItem};
use crate::workflow::reconciler::{DatasetReconciler, ReconcileReport};
use crate::workflow::sink::{DiscardSink, IncrementalSink};
use crate::workflow::worker_pool::BatchedWorkerPool;
use pixvec_common::config::TomlConfig;
use serde::Serialize;
use std::path::PathBuf;

/// File locations of one embedding run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub input: PathBuf,
    pub store: PathBuf,
    pub output: PathBuf,
}

/// Result of a complete embedding run
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRunReport {
    pub summary: RunSummary,
    pub reconcile: ReconcileReport,
}

/// Dataset → embeddings → merged dataset
#[derive(Debug, Clone)]
pub struct EmbeddingPipeline {
    source: ItemSource,
    pool: BatchedWorkerPool,
    reconciler: DatasetReconciler,
    paths: DatasetPaths,
    resume: bool,
}

impl EmbeddingPipeline {
    pub fn new(
        source: ItemSource,
        pool: BatchedWorkerPool,
        reconciler: DatasetReconciler,
        paths: DatasetPaths,
    ) -> Self {
        Self {
            source,
            pool,
            reconciler,
            paths,
            resume: false,
        }
    }

    /// Keep the store of an earlier run and skip keys it already holds
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn from_config(config: &TomlConfig, mode: VectorizeMode) -> IngestResult<Self> {
        let dataset = &config.dataset;
        let locator = match mode {
            VectorizeMode::LocalFile => LocatorStrategy::LocalFolder(dataset.images_folder.clone()),
            VectorizeMode::ImageUrl => match (&dataset.locator_column, &dataset.images_base_url) {
                (Some(column), _) => LocatorStrategy::Column(column.clone()),
                (None, Some(base_url)) => LocatorStrategy::UrlPrefix(base_url.clone()),
                (None, None) => {
                    return Err(IngestError::Startup(
                        "URL vectorization needs dataset.locator_column or dataset.images_base_url"
                            .into(),
                    ))
                }
            },
            VectorizeMode::Text => match &dataset.locator_column {
                Some(column) => LocatorStrategy::Column(column.clone()),
                None => {
                    return Err(IngestError::Startup(
                        "Text vectorization needs dataset.locator_column".into(),
                    ))
                }
            },
        };

        let source = ItemSource::from_config(dataset)?.with_locator(locator);
        let pool = BatchedWorkerPool::new(PoolSettings::from_config(&config.pipeline)?);
        let reconciler = DatasetReconciler::from_config(dataset)?;
        let paths = DatasetPaths {
            input: dataset.input.clone(),
            store: dataset.store.clone(),
            output: dataset.output.clone(),
        };

        Ok(Self::new(source, pool, reconciler, paths).with_resume(config.pipeline.resume))
    }

    pub fn paths(&self) -> &DatasetPaths {
        &self.paths
    }

    /// Run all batches, then reconcile
    pub async fn run<C>(&self, caller: &C) -> IngestResult<EmbeddingRunReport>
    where
        C: RemoteCaller<Output = Embedding> + ?Sized,
    {
        let items = self.source.load(&self.paths.input)?;
        tracing::info!(
            dataset = %self.paths.input.display(),
            "Number of images in the dataset: {}",
            items.len()
        );

        let (mut sink, items, skipped) = if self.resume {
            let sink = IncrementalSink::open_existing(&self.paths.store)?;
            let done = sink.existing_keys()?;
            let total = items.len();
            let pending: Vec<WorkItem> = items
                .into_iter()
                .filter(|item| !done.contains(item.key()))
                .collect();
            let skipped = total - pending.len();
            if skipped > 0 {
                tracing::info!(skipped, store = %self.paths.store.display(), "Resuming, keys already stored");
            }
            (sink, pending, skipped)
        } else {
            (IncrementalSink::create(&self.paths.store)?, items, 0)
        };

        let mut summary = self.pool.run(&items, caller, &mut sink).await?;
        summary.skipped = skipped;

        let reconcile = self
            .reconciler
            .merge(&self.paths.input, &self.paths.store, &self.paths.output)?;

        Ok(EmbeddingRunReport { summary, reconcile })
    }
}

/// Final dataset → image files uploaded to a container
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    source: ItemSource,
    pool: BatchedWorkerPool,
    input: PathBuf,
}

impl UploadPipeline {
    pub fn new(source: ItemSource, pool: BatchedWorkerPool, input: impl Into<PathBuf>) -> Self {
        Self {
            source,
            pool,
            input: input.into(),
        }
    }

    /// Reads the merged output dataset; images come from `images_folder`
    pub fn from_config(config: &TomlConfig) -> IngestResult<Self> {
        let dataset = &config.dataset;
        let source = ItemSource::from_config(dataset)?
            .with_locator(LocatorStrategy::LocalFolder(dataset.images_folder.clone()));
        let pool = BatchedWorkerPool::new(PoolSettings::from_config(&config.pipeline)?);

        Ok(Self::new(source, pool, dataset.output.clone()))
    }

    pub async fn run(&self, client: &BlobContainerClient) -> IngestResult<RunSummary> {
        let items = self.source.load(&self.input)?;

        client.create_container().await?;
        tracing::info!(
            container = client.container(),
            items = items.len(),
            "Uploading images to container"
        );

        self.pool.run(&items, client, &mut DiscardSink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(locator_column: Option<&str>, base_url: Option<&str>) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.dataset.locator_column = locator_column.map(String::from);
        config.dataset.images_base_url = base_url.map(String::from);
        config
    }

    #[test]
    fn test_url_mode_needs_a_locator() {
        let err = EmbeddingPipeline::from_config(&config_with(None, None), VectorizeMode::ImageUrl)
            .unwrap_err();
        assert!(err.is_startup());

        assert!(EmbeddingPipeline::from_config(
            &config_with(None, Some("https://acct.blob.core.windows.net/images")),
            VectorizeMode::ImageUrl
        )
        .is_ok());
    }

    #[test]
    fn test_text_mode_needs_locator_column() {
        let err = EmbeddingPipeline::from_config(&config_with(None, Some("https://x.test")), VectorizeMode::Text)
            .unwrap_err();
        assert!(err.is_startup());

        assert!(
            EmbeddingPipeline::from_config(&config_with(Some("title"), None), VectorizeMode::Text)
                .is_ok()
        );
    }

    #[test]
    fn test_default_paths_from_config() {
        let pipeline =
            EmbeddingPipeline::from_config(&TomlConfig::default(), VectorizeMode::LocalFile)
                .unwrap();
        assert_eq!(pipeline.paths().input, PathBuf::from("dataset/dataset.csv"));
        assert_eq!(pipeline.paths().store, PathBuf::from("dataset/embeddings.csv"));
        assert!(!pipeline.resume);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut config = TomlConfig::default();
        config.pipeline.concurrency = 0;
        let err = UploadPipeline::from_config(&config).unwrap_err();
        assert!(err.is_startup());
    }
}
