//! Per-item remote call seam
//!
//! A [`RemoteCaller`] performs exactly one network attempt for one
//! [`WorkItem`] and always answers with a [`CallOutcome`]. Transport errors,
//! non-2xx statuses and empty bodies become `Failure` values; nothing is
//! returned as an `Err` and nothing is retried.

use crate::types::{CallOutcome, WorkItem};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait RemoteCaller: Send + Sync {
    /// Value carried by a `Success` outcome
    type Output: Send + 'static;

    /// Short name used in log events
    fn name(&self) -> &'static str;

    /// Wait until the caller may issue its next call (client-side throttling)
    ///
    /// Awaited by the worker pool before the per-call timeout starts.
    async fn ready(&self) {}

    /// Perform one call for `item`
    async fn call(&self, item: &WorkItem) -> CallOutcome<Self::Output>;
}

#[async_trait]
impl<C: RemoteCaller + ?Sized> RemoteCaller for Arc<C> {
    type Output = C::Output;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn ready(&self) {
        (**self).ready().await
    }

    async fn call(&self, item: &WorkItem) -> CallOutcome<Self::Output> {
        (**self).call(item).await
    }
}
