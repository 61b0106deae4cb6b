//! Offline mutation queue.
//!
//! Write operations requested while the backend is unreachable are persisted
//! and delivered later by a single-worker drain loop:
//!
//! - every state transition is persisted before the next step, so a killed
//!   process loses at most the knowledge that one delivery already happened;
//! - a failed reachability probe aborts the pass without touching any retry
//!   counter, only a failed delivery counts against `max_retries`;
//! - items are delivered oldest first and at most one pass runs at a time.
//!
//! `enqueue` only appends to the in-memory list and persists it. It is safe to
//! call while a pass is running; the pass never holds the list lock across a
//! backend call.

mod drain;
mod status;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::QueueConfig;
use crate::dispatch::OperationDispatcher;
use crate::error::{Error, Result};
use crate::models::{ItemId, QueueItem, QueueItemStatus, QueueOperation};
use crate::network::ConnectivityProbe;
use crate::store::QueueStore;
use crate::util::unix_millis_now;

pub use drain::{DrainOutcome, DrainSummary};
pub use status::QueueStatus;

/// Shortest accepted periodic sync interval
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Durable, retrying queue of backend mutations.
///
/// Owned by the host's composition root; share it behind an `Arc` when
/// several components enqueue. Dropping it stops the periodic sync timer.
pub struct OfflineQueue {
    shared: Arc<Shared>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    items: Mutex<Vec<QueueItem>>,
    /// Serializes snapshot writes so the store always sees mutations in order
    persist_lock: tokio::sync::Mutex<()>,
    drain_lock: drain::DrainLock,
    /// Set while a delayed drain is waiting to fire; at most one exists
    drain_scheduled: AtomicBool,
    store: Arc<dyn QueueStore>,
    dispatcher: Arc<dyn OperationDispatcher>,
    probe: Arc<dyn ConnectivityProbe>,
    config: QueueConfig,
}

impl OfflineQueue {
    /// Load the persisted queue and wire it to its collaborators.
    ///
    /// Items left `processing` by a previous process are returned to
    /// `pending`, and items past the retention horizon are purged.
    pub async fn open(
        store: Arc<dyn QueueStore>,
        dispatcher: Arc<dyn OperationDispatcher>,
        probe: Arc<dyn ConnectivityProbe>,
        config: QueueConfig,
    ) -> Result<Self> {
        let records = store.load().await?;
        let loaded = records.len();
        let mut items = decode_records(records);
        let mut dirty = items.len() != loaded;

        for item in items
            .iter_mut()
            .filter(|item| item.status == QueueItemStatus::Processing)
        {
            tracing::info!(item_id = %item.id, "Returning interrupted item to pending");
            item.status = QueueItemStatus::Pending;
            dirty = true;
        }

        let cutoff = retention_cutoff(&config, unix_millis_now());
        let before = items.len();
        items.retain(|item| !item.is_older_than(cutoff));
        if items.len() != before {
            tracing::info!(purged = before - items.len(), "Purged expired queue items");
            dirty = true;
        }

        if dirty {
            store.save(&items).await?;
        }
        tracing::info!(items = items.len(), "Loaded offline queue");

        Ok(Self {
            shared: Arc::new(Shared {
                items: Mutex::new(items),
                persist_lock: tokio::sync::Mutex::new(()),
                drain_lock: drain::DrainLock::default(),
                drain_scheduled: AtomicBool::new(false),
                store,
                dispatcher,
                probe,
                config,
            }),
            periodic: Mutex::new(None),
        })
    }

    /// Queue an operation with the configured default retry cap
    pub async fn enqueue(&self, operation: QueueOperation) -> ItemId {
        self.enqueue_with_retries(operation, self.shared.config.default_max_retries)
            .await
    }

    /// Queue an operation that gives up after `max_retries` failed deliveries.
    ///
    /// Never fails: if the store rejects the write the item is kept in memory
    /// and persisted with the next successful snapshot.
    pub async fn enqueue_with_retries(&self, operation: QueueOperation, max_retries: u32) -> ItemId {
        let item = QueueItem::new(operation, max_retries, unix_millis_now());
        let id = item.id.clone();
        let kind = item.kind();

        let ((), saved) = self.shared.mutate(move |items| items.push(item)).await;
        if let Err(error) = saved {
            tracing::warn!(item_id = %id, error = %error, "Queued item kept in memory only");
        }
        tracing::debug!(item_id = %id, kind = %kind, max_retries, "Enqueued operation");

        if self.shared.config.auto_drain {
            self.shared.spawn_drain();
        }
        id
    }

    /// Counts by status, read from memory without waiting on I/O
    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus::from_items(&self.shared.lock_items())
    }

    /// Snapshot of all items, oldest first
    pub fn items(&self) -> Vec<QueueItem> {
        self.shared.lock_items().clone()
    }

    pub fn get(&self, id: &ItemId) -> Option<QueueItem> {
        self.shared
            .lock_items()
            .iter()
            .find(|item| &item.id == id)
            .cloned()
    }

    /// Whether a drain pass currently holds the drain lock
    pub fn is_draining(&self) -> bool {
        self.shared.drain_lock.is_held()
    }

    /// Run one drain pass now and report what it did
    pub async fn process_queue(&self) -> DrainOutcome {
        Arc::clone(&self.shared).drain().await
    }

    /// Move every failed item back to pending with a fresh retry budget.
    ///
    /// Items in any other status are left untouched.
    pub async fn retry_failed(&self) -> Result<usize> {
        let (reset, saved) = self
            .shared
            .mutate(|items| {
                let mut reset = 0;
                for item in items
                    .iter_mut()
                    .filter(|item| item.status == QueueItemStatus::Failed)
                {
                    item.reset_for_retry();
                    reset += 1;
                }
                reset
            })
            .await;
        saved?;
        tracing::info!(reset, "Requeued failed items");

        if reset > 0 && self.shared.config.auto_drain {
            self.shared.spawn_drain();
        }
        Ok(reset)
    }

    /// Drop completed items that have not been removed yet
    pub async fn clear_completed(&self) -> Result<usize> {
        self.remove_where(|item| item.status == QueueItemStatus::Completed)
            .await
    }

    /// Drop every item regardless of status
    pub async fn clear_all(&self) -> Result<usize> {
        self.remove_where(|_| true).await
    }

    /// Remove a single item; returns whether it existed
    pub async fn remove(&self, id: &ItemId) -> Result<bool> {
        let removed = self.remove_where(|item| &item.id == id).await?;
        Ok(removed > 0)
    }

    /// Purge items older than the retention horizon, whatever their status
    pub async fn cleanup_old_items(&self) -> Result<usize> {
        self.shared.purge_expired(unix_millis_now()).await
    }

    async fn remove_where(&self, predicate: impl Fn(&QueueItem) -> bool + Send) -> Result<usize> {
        self.shared.remove_where(predicate).await
    }

    /// Drain on a fixed interval while connectivity is available.
    ///
    /// Each tick also purges expired items. Calling this again replaces the
    /// running timer. Requires a tokio runtime.
    pub fn start_periodic_sync(&self, interval: Duration) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| {
            Error::InvalidInput("periodic sync requires a tokio runtime".to_string())
        })?;
        let interval = interval.max(MIN_SYNC_INTERVAL);
        let weak = Arc::downgrade(&self.shared);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };

                if let Err(error) = shared.purge_expired(unix_millis_now()).await {
                    tracing::warn!(error = %error, "Periodic queue cleanup failed");
                }
                if shared.probe.is_reachable().await {
                    // Spawned rather than awaited so stopping the timer never
                    // cancels a pass mid-delivery.
                    tokio::spawn(shared.drain());
                } else {
                    tracing::debug!("Periodic sync skipped: network unreachable");
                }
            }
        });

        if let Some(previous) = self.lock_periodic().replace(handle) {
            previous.abort();
        }
        tracing::info!(interval_ms = interval.as_millis(), "Started periodic sync");
        Ok(())
    }

    /// Stop the periodic timer; an in-flight drain pass runs to completion
    pub fn stop_periodic_sync(&self) {
        if let Some(handle) = self.lock_periodic().take() {
            handle.abort();
            tracing::info!("Stopped periodic sync");
        }
    }

    pub fn is_periodic_sync_running(&self) -> bool {
        self.lock_periodic()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn lock_periodic(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.periodic.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for OfflineQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_periodic().take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn lock_items(&self) -> MutexGuard<'_, Vec<QueueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the in-memory list and persist the resulting snapshot.
    ///
    /// The in-memory change is kept even when the write fails.
    async fn mutate<R, F>(&self, f: F) -> (R, Result<()>)
    where
        F: FnOnce(&mut Vec<QueueItem>) -> R + Send,
        R: Send,
    {
        let _persist = self.persist_lock.lock().await;
        let (result, snapshot) = {
            let mut items = self.lock_items();
            let result = f(&mut items);
            (result, items.clone())
        };
        let saved = self.store.save(&snapshot).await;
        (result, saved)
    }

    async fn remove_where(&self, predicate: impl Fn(&QueueItem) -> bool + Send) -> Result<usize> {
        let (removed, saved) = self
            .mutate(move |items| {
                let before = items.len();
                items.retain(|item| !predicate(item));
                before - items.len()
            })
            .await;
        saved?;
        Ok(removed)
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<usize> {
        let cutoff = retention_cutoff(&self.config, now_ms);
        let expired = self
            .lock_items()
            .iter()
            .any(|item| item.is_older_than(cutoff));
        if !expired {
            return Ok(0);
        }

        let purged = self
            .remove_where(move |item| item.is_older_than(cutoff))
            .await?;
        tracing::info!(purged, "Purged expired queue items");
        Ok(purged)
    }

    fn spawn_drain(self: &Arc<Self>) {
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(Arc::clone(self).drain());
            }
            Err(_) => tracing::warn!("No tokio runtime; drain deferred until next trigger"),
        }
    }

    /// Arm the delayed drain unless one is already waiting or nothing is
    /// left to deliver.
    fn schedule_drain(self: &Arc<Self>, delay: Duration) {
        if !self.lock_items().iter().any(QueueItem::is_pending) {
            tracing::debug!("Nothing pending; no drain scheduled");
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No tokio runtime; scheduled drain dropped");
            return;
        };
        if self
            .drain_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Drain already scheduled");
            return;
        }

        let shared = Arc::downgrade(self);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.drain_scheduled.store(false, Ordering::Release);
                shared.drain().await;
            }
        });
    }
}

fn retention_cutoff(config: &QueueConfig, now_ms: i64) -> i64 {
    let retention_ms = i64::try_from(config.retention.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(retention_ms)
}

fn decode_records(records: Vec<Value>) -> Vec<QueueItem> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<QueueItem>(record) {
            Ok(mut item) => {
                item.max_retries = item.max_retries.max(1);
                item.retry_count = item.retry_count.min(item.max_retries);
                Some(item)
            }
            Err(error) => {
                tracing::warn!(index, error = %error, "Skipping unreadable queue record");
                None
            }
        })
        .collect()
}
