//! Durable storage for the offline queue.
//!
//! The queue is persisted as one ordered list of records under a fixed key
//! and rewritten in full on every mutation.

mod json_file;
mod memory;
mod migrations;
mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::QueueItem;

pub use json_file::JsonFileQueueStore;
pub use memory::MemoryQueueStore;
pub use sqlite::SqliteQueueStore;

/// Fixed storage key (and file stem) of the persisted queue
pub const QUEUE_STORAGE_KEY: &str = "offline_queue";

/// Backing store for the queue snapshot
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load the raw persisted records, oldest first.
    ///
    /// Records are returned undecoded so a single unreadable entry does not
    /// make the whole queue unreadable.
    async fn load(&self) -> Result<Vec<Value>>;

    /// Replace the persisted queue with `items`
    async fn save(&self, items: &[QueueItem]) -> Result<()>;
}

fn parse_records(raw: &str) -> Result<Vec<Value>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}
