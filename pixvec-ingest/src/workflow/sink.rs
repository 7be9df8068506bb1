//! Per-batch persistence of call outcomes
//!
//! The worker pool hands every finished batch to an [`OutcomeSink`] before
//! starting the next one. [`IncrementalSink`] appends the successful
//! embeddings of the batch to the intermediate store, so a later crash keeps
//! every completed batch.
//!
//! Store format: `key,vector` rows, comma-delimited, no header. The vector
//! field is a JSON array (`[0.1,0.2,...]`), quoted by the csv writer.

use crate::error::{IngestError, IngestResult};
use crate::types::{CallOutcome, Embedding};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Field delimiter of the intermediate store
pub const STORE_DELIMITER: u8 = b',';

/// Receives the ordered outcomes of one batch
///
/// Returns the number of outcomes persisted. An `Err` aborts the run.
pub trait OutcomeSink<T> {
    fn append(&mut self, outcomes: Vec<CallOutcome<T>>) -> IngestResult<usize>;
}

/// Sink that keeps nothing (upload pathway)
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl<T> OutcomeSink<T> for DiscardSink {
    fn append(&mut self, outcomes: Vec<CallOutcome<T>>) -> IngestResult<usize> {
        Ok(outcomes.iter().filter(|o| o.is_success()).count())
    }
}

/// In-memory sink, keeps every outcome in order
impl<T> OutcomeSink<T> for Vec<CallOutcome<T>> {
    fn append(&mut self, outcomes: Vec<CallOutcome<T>>) -> IngestResult<usize> {
        let count = outcomes.len();
        self.extend(outcomes);
        Ok(count)
    }
}

/// Append-only intermediate store of successful embeddings
#[derive(Debug)]
pub struct IncrementalSink {
    path: PathBuf,
    rows_written: usize,
}

impl IncrementalSink {
    /// Reset the store (fresh run): creates or truncates the file
    pub fn create(path: impl Into<PathBuf>) -> IngestResult<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        File::create(&path).map_err(|e| IngestError::sink_io(&path, e))?;

        tracing::debug!(store = %path.display(), "Intermediate store reset");
        Ok(Self {
            path,
            rows_written: 0,
        })
    }

    /// Keep existing store content (resume); creates the file if missing
    ///
    /// A last row without its line terminator was cut off by an interrupted
    /// append and is truncated away, so its item is attempted again.
    pub fn open_existing(path: impl Into<PathBuf>) -> IngestResult<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| IngestError::sink_io(&path, e))?;

        let content = std::fs::read(&path).map_err(|e| IngestError::sink_io(&path, e))?;
        if !content.is_empty() && !content.ends_with(b"\n") {
            let complete = content
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |pos| pos + 1);
            tracing::warn!(
                store = %path.display(),
                dropped_bytes = content.len() - complete,
                "Intermediate store ends with a partial row, truncating it"
            );
            file.set_len(complete as u64)
                .and_then(|_| file.sync_data())
                .map_err(|e| IngestError::sink_io(&path, e))?;
        }

        Ok(Self {
            path,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this sink (excludes pre-existing rows)
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Keys of complete `key,vector` rows already in the store
    pub fn existing_keys(&self) -> IngestResult<HashSet<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(STORE_DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut keys = HashSet::new();
        for record in reader.records() {
            let record = record?;
            let key = match (record.get(0), record.get(1), record.len()) {
                (Some(key), Some(vector), 2) if is_vector(vector) => key.trim(),
                _ => continue,
            };
            if !key.is_empty() {
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }
}

impl OutcomeSink<Embedding> for IncrementalSink {
    fn append(&mut self, outcomes: Vec<CallOutcome<Embedding>>) -> IngestResult<usize> {
        let rows: Vec<(String, Embedding)> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                CallOutcome::Success { key, value } => Some((key, value)),
                CallOutcome::Failure { .. } => None,
            })
            .collect();

        if rows.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| IngestError::sink_io(&self.path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(STORE_DELIMITER)
            .has_headers(false)
            .from_writer(file);

        for (key, vector) in &rows {
            let vector = format_vector(vector).map_err(|e| IngestError::sink_io(&self.path, e))?;
            writer
                .write_record([key.as_str(), vector.as_str()])
                .map_err(|e| IngestError::sink_io(&self.path, io::Error::new(io::ErrorKind::Other, e)))?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| IngestError::sink_io(&self.path, e.into_error()))?;
        file.sync_data()
            .map_err(|e| IngestError::sink_io(&self.path, e))?;

        self.rows_written += rows.len();
        Ok(rows.len())
    }
}

/// Serialize a vector as a JSON array
pub fn format_vector(vector: &[f64]) -> io::Result<String> {
    serde_json::to_string(vector).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn is_vector(field: &str) -> bool {
    serde_json::from_str::<Embedding>(field).map_or(false, |v| !v.is_empty())
}

fn ensure_parent(path: &Path) -> IngestResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::sink_io(parent, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureReason, WorkItem};
    use tempfile::TempDir;

    fn success(key: &str, vector: Vec<f64>) -> CallOutcome<Embedding> {
        CallOutcome::success(&WorkItem::new(key, key), vector)
    }

    fn failure(key: &str) -> CallOutcome<Embedding> {
        CallOutcome::failure(&WorkItem::new(key, key), FailureReason::NonSuccessStatus(500))
    }

    #[test]
    fn test_appends_only_successes_across_batches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store").join("embeddings.csv");
        let mut sink = IncrementalSink::create(&path).unwrap();

        let first = sink
            .append(vec![success("a.jpg", vec![0.5, 1.0]), failure("b.jpg")])
            .unwrap();
        let second = sink
            .append(vec![failure("c.jpg"), success("d.jpg", vec![-0.25])])
            .unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(sink.rows_written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a.jpg,\"[0.5,1.0]\"\nd.jpg,[-0.25]\n");
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.csv");
        std::fs::write(&path, "old.jpg,\"[1.0,2.0]\"\n").unwrap();

        let sink = IncrementalSink::create(&path).unwrap();
        assert!(sink.existing_keys().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_open_existing_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.csv");
        std::fs::write(&path, "old.jpg,\"[1.0,2.0]\"\n").unwrap();

        let mut sink = IncrementalSink::open_existing(&path).unwrap();
        sink.append(vec![success("new.jpg", vec![3.0])]).unwrap();

        let keys = sink.existing_keys().unwrap();
        assert!(keys.contains("old.jpg"));
        assert!(keys.contains("new.jpg"));
    }

    #[test]
    fn test_open_existing_drops_partial_last_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.csv");
        std::fs::write(&path, "img1.jpg,\"[0.1,0.2]\"\nimg2.jpg,\"[0.4,").unwrap();

        let mut sink = IncrementalSink::open_existing(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "img1.jpg,\"[0.1,0.2]\"\n"
        );

        let keys = sink.existing_keys().unwrap();
        assert!(keys.contains("img1.jpg"));
        assert!(!keys.contains("img2.jpg"));

        sink.append(vec![success("img2.jpg", vec![0.4, 0.5])]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "img1.jpg,\"[0.1,0.2]\"\nimg2.jpg,\"[0.4,0.5]\"\n"
        );
    }

    #[test]
    fn test_open_existing_single_partial_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.csv");
        std::fs::write(&path, "img1.jpg,\"[0.1").unwrap();

        let sink = IncrementalSink::open_existing(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert!(sink.existing_keys().unwrap().is_empty());
    }

    #[test]
    fn test_existing_keys_skips_rows_without_vector() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.csv");
        std::fs::write(&path, "img1.jpg,\"[0.1,0.2]\"\nimg2.jpg\nimg3.jpg,oops\n").unwrap();

        let keys = IncrementalSink::open_existing(&path)
            .unwrap()
            .existing_keys()
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("img1.jpg"));
    }

    #[test]
    fn test_all_failures_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.csv");
        let mut sink = IncrementalSink::create(&path).unwrap();

        assert_eq!(sink.append(vec![failure("x.jpg")]).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_discard_sink_counts_successes() {
        let mut sink = DiscardSink;
        let outcomes = vec![success("a", vec![1.0]), failure("b"), success("c", vec![2.0])];
        assert_eq!(sink.append(outcomes).unwrap(), 2);
    }
}
