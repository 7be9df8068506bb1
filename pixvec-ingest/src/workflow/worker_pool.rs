//! Batched, bounded-concurrency execution of remote calls
//!
//! Items are split into contiguous batches of `batch_size`. Batches run
//! strictly one after another; inside a batch at most `concurrency` calls are
//! in flight (`buffer_unordered`). Outcomes are put back into input order
//! before the batch is handed to the sink, and the next batch starts only
//! after the sink returned.
//!
//! Every call is bounded by `call_timeout`. A timeout or a panic inside the
//! caller becomes a `TransportError` failure for that item only. The wait in
//! [`RemoteCaller::ready`] (rate limiting) is not part of the timeout.

use crate::config::PoolSettings;
use crate::error::IngestResult;
use crate::services::remote_caller::RemoteCaller;
use crate::types::{CallOutcome, FailureReason, RunSummary, WorkItem};
use crate::workflow::sink::OutcomeSink;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Batched worker pool
#[derive(Debug, Clone)]
pub struct BatchedWorkerPool {
    settings: PoolSettings,
}

impl BatchedWorkerPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings: PoolSettings {
                batch_size: settings.batch_size.max(1),
                concurrency: settings.concurrency.max(1),
                call_timeout: settings.call_timeout,
            },
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Run one batch; outcomes come back in input order
    pub async fn run_batch<C>(&self, batch: &[WorkItem], caller: &C) -> Vec<CallOutcome<C::Output>>
    where
        C: RemoteCaller + ?Sized,
    {
        let call_timeout = self.settings.call_timeout;

        let mut indexed: Vec<(usize, CallOutcome<C::Output>)> = stream::iter(batch.iter().enumerate())
            .map(|(index, item)| async move {
                (index, guarded_call(caller, item, call_timeout).await)
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        indexed.sort_unstable_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Run every item batch by batch, sinking each batch before the next
    ///
    /// Item failures are logged and counted; only a sink error aborts.
    pub async fn run<C, S>(
        &self,
        items: &[WorkItem],
        caller: &C,
        sink: &mut S,
    ) -> IngestResult<RunSummary>
    where
        C: RemoteCaller + ?Sized,
        S: OutcomeSink<C::Output> + ?Sized,
    {
        let mut summary = RunSummary::start();
        let total_batches = items.len().div_ceil(self.settings.batch_size);

        tracing::info!(
            run_id = %summary.run_id,
            caller = caller.name(),
            items = items.len(),
            batches = total_batches,
            batch_size = self.settings.batch_size,
            concurrency = self.settings.concurrency,
            "Starting batched run"
        );

        for (batch_index, batch) in items.chunks(self.settings.batch_size).enumerate() {
            let batch_start = Instant::now();
            let outcomes = self.run_batch(batch, caller).await;

            let mut batch_failed = 0;
            for (item, outcome) in batch.iter().zip(&outcomes) {
                summary.record(outcome);
                if let Some(reason) = outcome.failure_reason() {
                    batch_failed += 1;
                    tracing::warn!(
                        run_id = %summary.run_id,
                        key = item.key(),
                        locator = item.locator(),
                        reason = %reason,
                        "An error occurred while processing {}", item.key()
                    );
                }
            }

            let persisted = sink.append(outcomes)?;
            summary.batches += 1;

            tracing::info!(
                run_id = %summary.run_id,
                batch = batch_index + 1,
                of = total_batches,
                succeeded = batch.len() - batch_failed,
                failed = batch_failed,
                persisted,
                elapsed_ms = batch_start.elapsed().as_millis() as u64,
                "Processed batch {}/{}",
                batch_index + 1,
                total_batches
            );
        }

        summary.finish();
        tracing::info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Run completed: {}/{} items succeeded",
            summary.succeeded,
            summary.processed
        );

        Ok(summary)
    }
}

async fn guarded_call<C>(caller: &C, item: &WorkItem, call_timeout: Duration) -> CallOutcome<C::Output>
where
    C: RemoteCaller + ?Sized,
{
    if AssertUnwindSafe(caller.ready()).catch_unwind().await.is_err() {
        return CallOutcome::failure(
            item,
            FailureReason::TransportError(format!("{} throttle panicked", caller.name())),
        );
    }

    let call = AssertUnwindSafe(caller.call(item)).catch_unwind();

    match tokio::time::timeout(call_timeout, call).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => CallOutcome::failure(
            item,
            FailureReason::TransportError(format!("{} call panicked", caller.name())),
        ),
        Err(_) => CallOutcome::failure(
            item,
            FailureReason::TransportError(format!("timed out after {:?}", call_timeout)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Succeeds with the key length, fails for keys starting with "bad"
    struct KeyLengthCaller;

    #[async_trait]
    impl RemoteCaller for KeyLengthCaller {
        type Output = usize;

        fn name(&self) -> &'static str {
            "key-length"
        }

        async fn call(&self, item: &WorkItem) -> CallOutcome<usize> {
            if item.key().starts_with("bad") {
                CallOutcome::failure(item, FailureReason::NonSuccessStatus(400))
            } else {
                CallOutcome::success(item, item.key().len())
            }
        }
    }

    fn items(keys: &[&str]) -> Vec<WorkItem> {
        keys.iter().map(|k| WorkItem::new(*k, *k)).collect()
    }

    fn pool(batch_size: usize, concurrency: usize) -> BatchedWorkerPool {
        BatchedWorkerPool::new(PoolSettings {
            batch_size,
            concurrency,
            call_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_run_batch_preserves_order() {
        let batch = items(&["a", "bad1", "ccc"]);
        let outcomes = pool(10, 2).run_batch(&batch, &KeyLengthCaller).await;

        let keys: Vec<&str> = outcomes.iter().map(|o| o.key()).collect();
        assert_eq!(keys, vec!["a", "bad1", "ccc"]);
        assert_eq!(
            outcomes[2],
            CallOutcome::Success {
                key: "ccc".into(),
                value: 3
            }
        );
    }

    #[tokio::test]
    async fn test_run_counts_and_batches() {
        let all = items(&["a", "bad", "cc", "d", "bad2"]);
        let mut collected: Vec<CallOutcome<usize>> = Vec::new();

        let summary = pool(2, 4)
            .run(&all, &KeyLengthCaller, &mut collected)
            .await
            .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(collected.len(), 5);
    }

    #[tokio::test]
    async fn test_zero_settings_are_clamped() {
        let p = pool(0, 0);
        assert_eq!(p.settings().batch_size, 1);
        assert_eq!(p.settings().concurrency, 1);
    }

    #[tokio::test]
    async fn test_empty_input_runs_no_batches() {
        let mut collected: Vec<CallOutcome<usize>> = Vec::new();
        let summary = pool(3, 2)
            .run(&[], &KeyLengthCaller, &mut collected)
            .await
            .unwrap();

        assert_eq!(summary.batches, 0);
        assert_eq!(summary.processed, 0);
        assert!(collected.is_empty());
    }
}
