//! Drain pass: deliver pending items to the backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::Shared;
use crate::models::{FailureDisposition, ItemId, QueueOperation};

type DrainFuture = Pin<Box<dyn Future<Output = DrainOutcome> + Send>>;

/// Result of one call into the drain loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Another pass holds the drain lock; nothing was attempted
    AlreadyRunning,
    /// Reachability probe failed; no item was touched
    Offline,
    /// A full pass over the items pending at its start
    Drained(DrainSummary),
}

/// Per-pass delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub delivered: usize,
    pub requeued: usize,
    pub failed: usize,
}

impl DrainSummary {
    pub const fn attempted(&self) -> usize {
        self.delivered + self.requeued + self.failed
    }
}

/// Single-slot lock making the drain loop non-reentrant
#[derive(Debug, Default)]
pub(super) struct DrainLock(AtomicBool);

impl DrainLock {
    fn try_acquire(&self) -> Option<DrainGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(&self.0))
    }

    pub(super) fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the drain lock when dropped, including on panic
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Delivery {
    Delivered,
    Failed(FailureDisposition),
    /// Removed or no longer pending by the time the pass reached it
    Skipped,
}

impl Shared {
    /// Run one drain pass.
    ///
    /// Boxed so follow-up passes can be scheduled from inside a pass.
    pub(super) fn drain(self: Arc<Self>) -> DrainFuture {
        Box::pin(async move {
            let Some(guard) = self.drain_lock.try_acquire() else {
                tracing::debug!("Drain already in progress");
                return DrainOutcome::AlreadyRunning;
            };

            if !self.probe.is_reachable().await {
                drop(guard);
                tracing::info!("Network unreachable; deferring queue drain");
                if let Some(delay) = self.config.offline_retry_delay {
                    self.schedule_drain(delay);
                }
                return DrainOutcome::Offline;
            }

            let batch: Vec<ItemId> = self
                .lock_items()
                .iter()
                .filter(|item| item.is_pending())
                .map(|item| item.id.clone())
                .collect();
            tracing::debug!(pending = batch.len(), "Starting drain pass");

            let mut summary = DrainSummary::default();
            for id in &batch {
                match self.deliver(id).await {
                    Delivery::Delivered => summary.delivered += 1,
                    Delivery::Failed(FailureDisposition::Requeued) => summary.requeued += 1,
                    Delivery::Failed(FailureDisposition::Failed) => summary.failed += 1,
                    Delivery::Skipped => {}
                }
            }

            let pending_remaining = self.lock_items().iter().any(|item| item.is_pending());
            drop(guard);

            tracing::info!(
                delivered = summary.delivered,
                requeued = summary.requeued,
                failed = summary.failed,
                pending_remaining,
                "Drain pass finished"
            );
            if pending_remaining {
                if let Some(delay) = self.config.follow_up_delay {
                    self.schedule_drain(delay);
                }
            }
            DrainOutcome::Drained(summary)
        })
    }

    async fn deliver(&self, id: &ItemId) -> Delivery {
        let (operation, saved) = self
            .mutate(|items| {
                let item = items
                    .iter_mut()
                    .find(|item| &item.id == id && item.is_pending())?;
                item.mark_processing();
                Some(item.operation.clone())
            })
            .await;
        log_persist_failure(id, saved);
        let Some(operation) = operation else {
            return Delivery::Skipped;
        };

        match self.dispatcher.dispatch(&operation).await {
            Ok(()) => self.complete(id, &operation).await,
            Err(error) => self.fail(id, &operation, &error.to_string()).await,
        }
    }

    async fn complete(&self, id: &ItemId, operation: &QueueOperation) -> Delivery {
        let (found, saved) = self
            .mutate(|items| {
                items
                    .iter_mut()
                    .find(|item| &item.id == id)
                    .map(crate::models::QueueItem::mark_completed)
                    .is_some()
            })
            .await;
        log_persist_failure(id, saved);

        let ((), saved) = self
            .mutate(|items| items.retain(|item| &item.id != id))
            .await;
        log_persist_failure(id, saved);

        if found {
            tracing::info!(item_id = %id, kind = %operation.kind(), "Delivered queued operation");
        } else {
            tracing::debug!(item_id = %id, "Delivered item was removed during delivery");
        }
        Delivery::Delivered
    }

    async fn fail(&self, id: &ItemId, operation: &QueueOperation, message: &str) -> Delivery {
        let (outcome, saved) = self
            .mutate(|items| {
                let item = items.iter_mut().find(|item| &item.id == id)?;
                let disposition = item.record_failure(message);
                Some((disposition, item.retry_count, item.max_retries))
            })
            .await;
        log_persist_failure(id, saved);

        let Some((disposition, retry_count, max_retries)) = outcome else {
            tracing::debug!(item_id = %id, "Failed item was removed during delivery");
            return Delivery::Skipped;
        };

        match disposition {
            FailureDisposition::Requeued => tracing::warn!(
                item_id = %id,
                kind = %operation.kind(),
                retry_count,
                max_retries,
                error = message,
                "Delivery failed; will retry"
            ),
            FailureDisposition::Failed => tracing::error!(
                item_id = %id,
                kind = %operation.kind(),
                retry_count,
                error = message,
                "Delivery failed; retry limit reached"
            ),
        }
        Delivery::Failed(disposition)
    }
}

fn log_persist_failure(id: &ItemId, saved: crate::error::Result<()>) {
    if let Err(error) = saved {
        tracing::warn!(item_id = %id, error = %error, "Failed to persist queue snapshot");
    }
}
