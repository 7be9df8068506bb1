//! Work items from the source dataset
//!
//! Reads a delimited file with a header row, extracts the key column and
//! builds one [`WorkItem`] per row in file order. No deduplication: a key
//! that appears twice yields two items.

use crate::error::{IngestError, IngestResult};
use crate::types::WorkItem;
use pixvec_common::config::DatasetConfig;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// How the payload locator of an item is derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorStrategy {
    /// `<folder>/<key>` on local storage
    LocalFolder(PathBuf),
    /// `<prefix>/<key>`, e.g. a public container URL
    UrlPrefix(String),
    /// Value of another column of the same row (URL or text)
    Column(String),
}

/// Source dataset reader
#[derive(Debug, Clone)]
pub struct ItemSource {
    key_column: String,
    delimiter: u8,
    locator: LocatorStrategy,
}

impl ItemSource {
    pub fn new(key_column: impl Into<String>, delimiter: u8, locator: LocatorStrategy) -> Self {
        Self {
            key_column: key_column.into(),
            delimiter,
            locator,
        }
    }

    /// Build from dataset config: `locator_column` when set, else the images folder
    pub fn from_config(dataset: &DatasetConfig) -> IngestResult<Self> {
        let delimiter = crate::config::delimiter_byte(dataset.delimiter)?;
        let locator = match &dataset.locator_column {
            Some(column) => LocatorStrategy::Column(column.clone()),
            None => LocatorStrategy::LocalFolder(dataset.images_folder.clone()),
        };
        Ok(Self::new(dataset.key_column.clone(), delimiter, locator))
    }

    pub fn with_locator(mut self, locator: LocatorStrategy) -> Self {
        self.locator = locator;
        self
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Load all work items from `path`
    pub fn load(&self, path: &Path) -> IngestResult<Vec<WorkItem>> {
        let file = File::open(path).map_err(|e| {
            IngestError::Startup(format!("Cannot open dataset {}: {}", path.display(), e))
        })?;
        self.load_from_reader(file)
    }

    /// Load all work items from any reader (header row first)
    pub fn load_from_reader<R: Read>(&self, reader: R) -> IngestResult<Vec<WorkItem>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let key_idx = column_index(&headers, &self.key_column)?;
        let locator_idx = match &self.locator {
            LocatorStrategy::Column(column) => Some(column_index(&headers, column)?),
            _ => None,
        };

        let mut items = Vec::new();
        for (row_no, record) in csv_reader.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = row_no + 2;

            let key = record
                .get(key_idx)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    IngestError::MalformedInput(format!(
                        "Row at line {} has no value in key column '{}'",
                        line, self.key_column
                    ))
                })?;

            let locator = match (&self.locator, locator_idx) {
                (LocatorStrategy::LocalFolder(folder), _) => {
                    folder.join(key).to_string_lossy().into_owned()
                }
                (LocatorStrategy::UrlPrefix(prefix), _) => {
                    format!("{}/{}", prefix.trim_end_matches('/'), key)
                }
                (LocatorStrategy::Column(column), Some(idx)) => record
                    .get(idx)
                    .map(|v| v.trim().to_string())
                    .ok_or_else(|| {
                        IngestError::MalformedInput(format!(
                            "Row at line {} has no value in column '{}'",
                            line, column
                        ))
                    })?,
                (LocatorStrategy::Column(column), None) => {
                    return Err(IngestError::MalformedInput(format!(
                        "Column '{}' not resolved",
                        column
                    )))
                }
            };

            items.push(WorkItem::new(key, locator));
        }

        tracing::debug!(
            items = items.len(),
            key_column = %self.key_column,
            "Loaded work items"
        );

        Ok(items)
    }
}

/// Index of `name` in the header row (whitespace-insensitive)
pub(crate) fn column_index(headers: &csv::StringRecord, name: &str) -> IngestResult<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name.trim())
        .ok_or_else(|| {
            IngestError::MalformedInput(format!("Key column '{}' not found in header", name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = "image_file\tdescription\tauthor\n\
                           img1.jpg\tA portrait\tRembrandt\n\
                           img2.jpg\tA landscape\tTurner\n\
                           img1.jpg\tDuplicate row\tUnknown\n";

    fn source(locator: LocatorStrategy) -> ItemSource {
        ItemSource::new("image_file", b'\t', locator)
    }

    #[test]
    fn test_preserves_order_and_duplicates() {
        let items = source(LocatorStrategy::LocalFolder(PathBuf::from("/data/images")))
            .load_from_reader(DATASET.as_bytes())
            .unwrap();

        let keys: Vec<&str> = items.iter().map(|i| i.key()).collect();
        assert_eq!(keys, vec!["img1.jpg", "img2.jpg", "img1.jpg"]);
        assert_eq!(
            Path::new(items[1].locator()),
            Path::new("/data/images/img2.jpg")
        );
    }

    #[test]
    fn test_url_prefix_locator() {
        let items = source(LocatorStrategy::UrlPrefix(
            "https://acct.blob.core.windows.net/images/".into(),
        ))
        .load_from_reader(DATASET.as_bytes())
        .unwrap();

        assert_eq!(
            items[0].locator(),
            "https://acct.blob.core.windows.net/images/img1.jpg"
        );
    }

    #[test]
    fn test_column_locator() {
        let items = source(LocatorStrategy::Column("description".into()))
            .load_from_reader(DATASET.as_bytes())
            .unwrap();

        assert_eq!(items[1].locator(), "A landscape");
    }

    #[test]
    fn test_missing_key_column_is_malformed() {
        let err = ItemSource::new("filename", b'\t', LocatorStrategy::Column("author".into()))
            .load_from_reader(DATASET.as_bytes())
            .unwrap_err();

        assert!(matches!(err, IngestError::MalformedInput(_)));
    }

    #[test]
    fn test_keys_are_trimmed_and_blank_rejected() {
        let data = "image_file\ttitle\n  img1.jpg \tX\n";
        let items = source(LocatorStrategy::LocalFolder(PathBuf::from("imgs")))
            .load_from_reader(data.as_bytes())
            .unwrap();
        assert_eq!(items[0].key(), "img1.jpg");

        let blank = "image_file\ttitle\n \tX\n";
        let err = source(LocatorStrategy::LocalFolder(PathBuf::from("imgs")))
            .load_from_reader(blank.as_bytes())
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
    }

    #[test]
    fn test_header_only_yields_no_items() {
        let items = source(LocatorStrategy::LocalFolder(PathBuf::from("imgs")))
            .load_from_reader("image_file\ttitle\n".as_bytes())
            .unwrap();
        assert!(items.is_empty());
    }
}
