use serde::Serialize;

use crate::models::{QueueItem, QueueItemStatus};

/// Aggregate queue counts for status indicators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStatus {
    pub fn from_items(items: &[QueueItem]) -> Self {
        items.iter().fold(
            Self {
                total: items.len(),
                ..Self::default()
            },
            |mut status, item| {
                match item.status {
                    QueueItemStatus::Pending => status.pending += 1,
                    QueueItemStatus::Processing => status.processing += 1,
                    QueueItemStatus::Completed => status.completed += 1,
                    QueueItemStatus::Failed => status.failed += 1,
                }
                status
            },
        )
    }

    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{QueueOperation, SyncRequest};

    fn item_with(status: QueueItemStatus) -> QueueItem {
        let mut item = QueueItem::new(
            QueueOperation::SyncData(SyncRequest {
                scope: "reports".to_string(),
                since: None,
            }),
            3,
            1,
        );
        item.status = status;
        item
    }

    #[test]
    fn counts_each_status() {
        let items = vec![
            item_with(QueueItemStatus::Pending),
            item_with(QueueItemStatus::Pending),
            item_with(QueueItemStatus::Processing),
            item_with(QueueItemStatus::Failed),
        ];

        assert_eq!(
            QueueStatus::from_items(&items),
            QueueStatus {
                total: 4,
                pending: 2,
                processing: 1,
                completed: 0,
                failed: 1,
            }
        );
    }

    #[test]
    fn empty_queue_reports_zeroes() {
        let status = QueueStatus::from_items(&[]);
        assert!(status.is_empty());
        assert_eq!(status.pending, 0);
    }
}
