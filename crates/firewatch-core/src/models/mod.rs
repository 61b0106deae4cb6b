//! Data models for Firewatch

mod operation;
mod queue_item;

pub use operation::{
    ImageUpload, NewReport, QueueOperation, QueueOperationKind, ReportStatus, ReportUpdate,
    Severity, SyncRequest,
};
pub use queue_item::{FailureDisposition, ItemId, QueueItem, QueueItemStatus};
