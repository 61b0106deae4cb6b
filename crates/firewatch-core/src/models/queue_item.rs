//! Queue item model

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::{QueueOperation, QueueOperationKind};

/// Identifier of a queued item: `<type>_<created ms>_<random suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a new ID for an operation created at `timestamp` (Unix ms)
    #[must_use]
    pub fn generate(kind: QueueOperationKind, timestamp: i64) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self(format!("{kind}_{timestamp}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery status of a queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueItemStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item ended up after a failed delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to `pending`, picked up by a later drain pass
    Requeued,
    /// Retry cap reached; waits for an explicit retry
    Failed,
}

/// A durable unit of pending backend work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: ItemId,
    pub operation: QueueOperation,
    /// Creation timestamp (Unix ms)
    pub timestamp: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: QueueItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    /// Create a pending item. A `max_retries` of zero is raised to one.
    #[must_use]
    pub fn new(operation: QueueOperation, max_retries: u32, timestamp: i64) -> Self {
        Self {
            id: ItemId::generate(operation.kind(), timestamp),
            operation,
            timestamp,
            retry_count: 0,
            max_retries: max_retries.max(1),
            status: QueueItemStatus::Pending,
            error: None,
        }
    }

    pub const fn kind(&self) -> QueueOperationKind {
        self.operation.kind()
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.status, QueueItemStatus::Pending)
    }

    pub fn mark_processing(&mut self) {
        self.status = QueueItemStatus::Processing;
    }

    pub fn mark_completed(&mut self) {
        self.status = QueueItemStatus::Completed;
        self.error = None;
    }

    /// Count a failed delivery attempt.
    ///
    /// `retry_count` never exceeds `max_retries`; reaching the cap moves the
    /// item to `failed` with `message` recorded.
    pub fn record_failure(&mut self, message: impl Into<String>) -> FailureDisposition {
        self.retry_count = self.retry_count.saturating_add(1).min(self.max_retries);
        if self.retry_count >= self.max_retries {
            self.status = QueueItemStatus::Failed;
            self.error = Some(message.into());
            FailureDisposition::Failed
        } else {
            self.status = QueueItemStatus::Pending;
            self.error = None;
            FailureDisposition::Requeued
        }
    }

    /// Reset a failed item so the next drain pass delivers it again
    pub fn reset_for_retry(&mut self) {
        self.status = QueueItemStatus::Pending;
        self.retry_count = 0;
        self.error = None;
    }

    /// Whether the item was created before `cutoff` (Unix ms)
    pub const fn is_older_than(&self, cutoff: i64) -> bool {
        self.timestamp < cutoff
    }
}
