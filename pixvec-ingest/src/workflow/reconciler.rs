//! Join of the source dataset with the intermediate store
//!
//! Inner join on the (trimmed) key. Original rows keep their order and their
//! fields verbatim; each gains a trailing `vector` column copied byte for
//! byte from the store. Rows without a partner on either side are dropped and
//! counted in the [`ReconcileReport`], never reported as an error.
//!
//! Duplicate keys are not collapsed: an original row matching two store rows
//! is emitted twice, once per store row, in store order.

use crate::error::{IngestError, IngestResult};
use crate::services::item_source::column_index;
use crate::workflow::sink::STORE_DELIMITER;
use pixvec_common::config::DatasetConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Name of the appended column
pub const VECTOR_COLUMN: &str = "vector";

/// Row counts of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Rows written to the output
    pub joined_rows: usize,
    /// Original rows with no store row
    pub dropped_original: usize,
    /// Store rows with no original row
    pub dropped_intermediate: usize,
}

#[derive(Debug, Clone)]
pub struct DatasetReconciler {
    key_column: String,
    delimiter: u8,
}

struct StoreRow {
    vector: String,
    matched: bool,
}

impl DatasetReconciler {
    pub fn new(key_column: impl Into<String>, delimiter: u8) -> Self {
        Self {
            key_column: key_column.into(),
            delimiter,
        }
    }

    pub fn from_config(dataset: &DatasetConfig) -> IngestResult<Self> {
        Ok(Self::new(
            dataset.key_column.clone(),
            crate::config::delimiter_byte(dataset.delimiter)?,
        ))
    }

    /// Merge files; `output` is truncated and rewritten on every call
    pub fn merge(&self, original: &Path, store: &Path, output: &Path) -> IngestResult<ReconcileReport> {
        let original_file = File::open(original).map_err(|e| {
            IngestError::Startup(format!("Cannot open dataset {}: {}", original.display(), e))
        })?;
        let store_file = File::open(store).map_err(|e| {
            IngestError::Startup(format!(
                "Cannot open intermediate store {}: {}",
                store.display(),
                e
            ))
        })?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IngestError::sink_io(parent, e))?;
            }
        }
        // Written next to the target and renamed on success; a failed merge
        // leaves the previous output untouched
        let tmp_path = tmp_output_path(output);
        let tmp_file = File::create(&tmp_path).map_err(|e| IngestError::sink_io(&tmp_path, e))?;

        let merged = self
            .merge_from(original_file, store_file, tmp_file)
            .map_err(|e| match e {
                IngestError::SinkIo { source, .. } => IngestError::sink_io(output, source),
                other => other,
            });
        let report = match merged {
            Ok(report) => report,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        std::fs::rename(&tmp_path, output).map_err(|e| IngestError::sink_io(output, e))?;

        tracing::info!(
            output = %output.display(),
            joined_rows = report.joined_rows,
            dropped_original = report.dropped_original,
            dropped_intermediate = report.dropped_intermediate,
            "Final dataset written"
        );

        Ok(report)
    }

    /// Merge from readers into a writer
    pub fn merge_from<O, S, W>(&self, original: O, store: S, output: W) -> IngestResult<ReconcileReport>
    where
        O: Read,
        S: Read,
        W: Write,
    {
        let (mut store_rows, store_count) = self.read_store(store)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(original);

        let headers = reader.headers()?.clone();
        let key_idx = column_index(&headers, &self.key_column)?;
        if headers.iter().any(|h| h.trim() == VECTOR_COLUMN) {
            return Err(IngestError::MalformedInput(format!(
                "Dataset already has a '{}' column",
                VECTOR_COLUMN
            )));
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_writer(output);

        let mut header_out: Vec<&str> = headers.iter().collect();
        header_out.push(VECTOR_COLUMN);
        writer.write_record(&header_out).map_err(write_error)?;

        let mut report = ReconcileReport::default();
        for (row_no, record) in reader.records().enumerate() {
            let record = record?;
            let key = record.get(key_idx).map(str::trim).unwrap_or_default();

            match store_rows.get_mut(key) {
                Some(rows) => {
                    for row in rows.iter_mut() {
                        let mut fields: Vec<&str> = record.iter().collect();
                        fields.push(row.vector.as_str());
                        writer.write_record(&fields).map_err(write_error)?;
                        row.matched = true;
                        report.joined_rows += 1;
                    }
                }
                None => {
                    tracing::debug!(key, line = row_no + 2, "No vector for dataset row");
                    report.dropped_original += 1;
                }
            }
        }

        writer.flush().map_err(|e| IngestError::sink_io("<output>", e))?;

        let matched_store_rows: usize = store_rows
            .values()
            .flat_map(|rows| rows.iter())
            .filter(|row| row.matched)
            .count();
        report.dropped_intermediate = store_count - matched_store_rows;

        Ok(report)
    }

    /// Key → store rows (in store order), plus total row count
    fn read_store<S: Read>(&self, store: S) -> IngestResult<(HashMap<String, Vec<StoreRow>>, usize)> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(STORE_DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(store);

        let mut rows: HashMap<String, Vec<StoreRow>> = HashMap::new();
        let mut count = 0;
        for (row_no, record) in reader.records().enumerate() {
            let record = record?;
            let (key, vector) = match (record.get(0), record.get(1), record.len()) {
                (Some(key), Some(vector), 2) if !key.trim().is_empty() => (key.trim(), vector),
                _ => {
                    return Err(IngestError::MalformedInput(format!(
                        "Intermediate store row {} is not a `key,vector` pair",
                        row_no + 1
                    )))
                }
            };

            rows.entry(key.to_string()).or_default().push(StoreRow {
                vector: vector.to_string(),
                matched: false,
            });
            count += 1;
        }

        Ok((rows, count))
    }
}

fn tmp_output_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

fn write_error(e: csv::Error) -> IngestError {
    IngestError::sink_io("<output>", io::Error::new(io::ErrorKind::Other, e))
}
