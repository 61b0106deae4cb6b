//! In-process queue store

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::QueueStore;
use crate::error::{Error, Result};
use crate::models::QueueItem;

/// Queue store that keeps the serialized snapshot in memory.
///
/// Useful for tests and hosts that do not need restarts to survive. Clones of
/// the snapshot are stored exactly as a durable store would see them.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    records: Mutex<Vec<Value>>,
    saves: AtomicUsize,
    reject_writes: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously persisted records
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Current persisted snapshot
    pub fn records(&self) -> Vec<Value> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Decoded persisted snapshot, skipping unreadable records
    pub fn items(&self) -> Vec<QueueItem> {
        self.records()
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail, simulating a full or unavailable device store
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<Vec<Value>> {
        Ok(self.records())
    }

    async fn save(&self, items: &[QueueItem]) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("memory store rejects writes".to_string()));
        }

        let snapshot = items
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))?;
        *records = snapshot;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
