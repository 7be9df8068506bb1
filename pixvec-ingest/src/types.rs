//! Core value types shared by the ingest pipeline
//!
//! - [`WorkItem`]: one unit of work (key + payload locator)
//! - [`CallOutcome`]: tagged result of one remote call for one item
//! - [`RunSummary`]: end-of-run bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Embedding vector returned by the vision service
pub type Embedding = Vec<f64>;

/// One unit of processing
///
/// Immutable once created by the item source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    key: String,
    locator: String,
}

impl WorkItem {
    pub fn new(key: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            locator: locator.into(),
        }
    }

    /// Unique item identifier (e.g. image file name)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Local path, URL or text the remote call operates on
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// Why a single remote call did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// No usable response: connect/send error, timeout, unreadable payload
    TransportError(String),
    /// Service answered with a non-2xx status
    NonSuccessStatus(u16),
    /// 2xx response without the expected field (or with an empty one)
    EmptyResult,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportError(msg) => write!(f, "transport error: {}", msg),
            Self::NonSuccessStatus(code) => write!(f, "error code: {}", code),
            Self::EmptyResult => write!(f, "empty result"),
        }
    }
}

/// Tagged result of one remote call
///
/// Produced exactly once per [`WorkItem`] per run.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success { key: String, value: T },
    Failure { key: String, reason: FailureReason },
}

impl<T> CallOutcome<T> {
    pub fn success(item: &WorkItem, value: T) -> Self {
        Self::Success {
            key: item.key().to_string(),
            value,
        }
    }

    pub fn failure(item: &WorkItem, reason: FailureReason) -> Self {
        Self::Failure {
            key: item.key().to_string(),
            reason,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Success { key, .. } | Self::Failure { key, .. } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(reason),
        }
    }
}

/// End-of-run statistics reported to the caller
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Items attempted this run
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items skipped because the store already held their key (resume)
    pub skipped: usize,
    pub batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            batches: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record<T>(&mut self, outcome: &CallOutcome<T>) {
        self.processed += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let item = WorkItem::new("img1.jpg", "/images/img1.jpg");
        let ok: CallOutcome<Embedding> = CallOutcome::success(&item, vec![0.5, 1.0]);
        let err: CallOutcome<Embedding> =
            CallOutcome::failure(&item, FailureReason::NonSuccessStatus(429));

        assert_eq!(ok.key(), "img1.jpg");
        assert!(ok.is_success());
        assert!(ok.failure_reason().is_none());
        assert!(!err.is_success());
        assert_eq!(err.failure_reason(), Some(&FailureReason::NonSuccessStatus(429)));
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(
            FailureReason::NonSuccessStatus(500).to_string(),
            "error code: 500"
        );
        assert_eq!(FailureReason::EmptyResult.to_string(), "empty result");
        assert!(FailureReason::TransportError("connection reset".into())
            .to_string()
            .contains("connection reset"));
    }

    #[test]
    fn test_summary_counts() {
        let item = WorkItem::new("a", "a");
        let mut summary = RunSummary::start();
        summary.record(&CallOutcome::success(&item, ()));
        summary.record(&CallOutcome::<()>::failure(&item, FailureReason::EmptyResult));
        summary.finish();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.finished_at.is_some());
    }
}
