use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use firewatch_core::config::QueueConfig;
use firewatch_core::dispatch::{DispatchError, DispatchResult, OperationDispatcher};
use firewatch_core::models::{
    NewReport, QueueOperationKind, ReportStatus, ReportUpdate, Severity, SyncRequest,
};
use firewatch_core::network::ConnectivityProbe;
use firewatch_core::store::MemoryQueueStore;
use firewatch_core::{
    DrainOutcome, DrainSummary, OfflineQueue, QueueItemStatus, QueueOperation, QueueStatus,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;

#[derive(Default)]
struct FakeProbe {
    online: AtomicBool,
    probes: AtomicUsize,
}

impl FakeProbe {
    fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            probes: AtomicUsize::new(0),
        }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for FakeProbe {
    async fn is_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

/// Records every dispatched operation; fails while scripted failures remain
#[derive(Default)]
struct RecordingDispatcher {
    calls: Mutex<Vec<QueueOperationKind>>,
    scripted_failures: Mutex<VecDeque<String>>,
    always_fail: AtomicBool,
}

impl RecordingDispatcher {
    fn always_failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.always_fail.store(true, Ordering::SeqCst);
        dispatcher
    }

    fn fail_next(&self, message: &str) {
        self.scripted_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    fn calls(&self) -> Vec<QueueOperationKind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, operation: &QueueOperation) -> DispatchResult<()> {
        self.calls.lock().unwrap().push(operation.kind());
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Api("backend unavailable (503)".to_string()));
        }
        if let Some(message) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(DispatchError::Api(message));
        }
        Ok(())
    }
}

/// Blocks inside `dispatch` until released
#[derive(Default)]
struct GateDispatcher {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl OperationDispatcher for GateDispatcher {
    async fn dispatch(&self, _operation: &QueueOperation) -> DispatchResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

struct Harness {
    queue: OfflineQueue,
    store: Arc<MemoryQueueStore>,
    dispatcher: Arc<RecordingDispatcher>,
    probe: Arc<FakeProbe>,
}

impl Harness {
    async fn new(online: bool) -> Self {
        Self::with(
            MemoryQueueStore::new(),
            RecordingDispatcher::default(),
            online,
            QueueConfig::default().manual(),
        )
        .await
    }

    async fn with(
        store: MemoryQueueStore,
        dispatcher: RecordingDispatcher,
        online: bool,
        config: QueueConfig,
    ) -> Self {
        let store = Arc::new(store);
        let dispatcher = Arc::new(dispatcher);
        let probe = Arc::new(FakeProbe::new(online));
        let queue = OfflineQueue::open(store.clone(), dispatcher.clone(), probe.clone(), config)
            .await
            .unwrap();
        Self {
            queue,
            store,
            dispatcher,
            probe,
        }
    }

    /// Reopen a queue over the same persisted snapshot, as after a restart
    async fn reopen(&self) -> OfflineQueue {
        OfflineQueue::open(
            self.store.clone(),
            self.dispatcher.clone(),
            self.probe.clone(),
            QueueConfig::default().manual(),
        )
        .await
        .unwrap()
    }
}

fn new_report(description: &str) -> QueueOperation {
    QueueOperation::CreateReport(NewReport {
        description: description.to_string(),
        latitude: 34.05,
        longitude: -118.25,
        severity: Some(Severity::High),
        fire_type: Some("brush".to_string()),
        image_uri: None,
    })
}

fn sync_data() -> QueueOperation {
    QueueOperation::SyncData(SyncRequest {
        scope: "reports".to_string(),
        since: None,
    })
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn enqueued_item_counts_as_pending_before_any_drain() {
    let harness = Harness::new(true).await;

    harness.queue.enqueue(new_report("Smoke near trailhead")).await;

    let status = harness.queue.queue_status();
    assert_eq!(status.total, 1);
    assert_eq!(status.pending, 1);
    assert!(harness.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn offline_drain_attempts_nothing_and_keeps_retry_counts() {
    let harness = Harness::new(false).await;
    let id = harness.queue.enqueue(new_report("Flames by the road")).await;

    assert_eq!(harness.queue.process_queue().await, DrainOutcome::Offline);

    assert!(harness.dispatcher.calls().is_empty());
    let item = harness.queue.get(&id).unwrap();
    assert_eq!(item.status, QueueItemStatus::Pending);
    assert_eq!(item.retry_count, 0);
}

#[tokio::test]
async fn three_offline_reports_are_delivered_and_removed_once_online() {
    let harness = Harness::new(false).await;
    for index in 0..3 {
        harness
            .queue
            .enqueue(new_report(&format!("Report {index}")))
            .await;
    }

    assert_eq!(
        harness.queue.queue_status(),
        QueueStatus {
            total: 3,
            pending: 3,
            processing: 0,
            completed: 0,
            failed: 0,
        }
    );

    harness.probe.set_online(true);
    let outcome = harness.queue.process_queue().await;

    assert_eq!(
        outcome,
        DrainOutcome::Drained(DrainSummary {
            delivered: 3,
            requeued: 0,
            failed: 0,
        })
    );
    assert_eq!(harness.queue.queue_status(), QueueStatus::default());
    assert!(harness.store.records().is_empty());
}

#[tokio::test]
async fn item_fails_after_max_retries_and_is_not_attempted_again() {
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::always_failing(),
        true,
        QueueConfig::default().manual(),
    )
    .await;
    let id = harness
        .queue
        .enqueue_with_retries(new_report("Unreachable backend"), 2)
        .await;

    let first = harness.queue.process_queue().await;
    assert_eq!(
        first,
        DrainOutcome::Drained(DrainSummary {
            delivered: 0,
            requeued: 1,
            failed: 0,
        })
    );
    assert_eq!(harness.queue.get(&id).unwrap().status, QueueItemStatus::Pending);

    let second = harness.queue.process_queue().await;
    assert_eq!(
        second,
        DrainOutcome::Drained(DrainSummary {
            delivered: 0,
            requeued: 0,
            failed: 1,
        })
    );

    let item = harness.queue.get(&id).unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);
    assert_eq!(item.retry_count, 2);
    assert_eq!(item.error.as_deref(), Some("Backend API error: backend unavailable (503)"));

    let third = harness.queue.process_queue().await;
    assert_eq!(third, DrainOutcome::Drained(DrainSummary::default()));
    assert_eq!(harness.dispatcher.calls().len(), 2);
}

#[tokio::test]
async fn different_operations_dispatch_once_each_in_enqueue_order() {
    let harness = Harness::new(true).await;
    harness.queue.enqueue(new_report("First")).await;
    harness.queue.enqueue(sync_data()).await;
    harness
        .queue
        .enqueue(QueueOperation::UpdateReport(ReportUpdate {
            report_id: "report-1".to_string(),
            status: Some(ReportStatus::Contained),
            description: None,
            severity: None,
        }))
        .await;

    harness.queue.process_queue().await;

    assert_eq!(
        harness.dispatcher.calls(),
        vec![
            QueueOperationKind::CreateReport,
            QueueOperationKind::SyncData,
            QueueOperationKind::UpdateReport,
        ]
    );
}

#[tokio::test]
async fn retry_failed_only_touches_failed_items() {
    let dispatcher = RecordingDispatcher::default();
    dispatcher.fail_next("rejected payload (422)");
    dispatcher.fail_next("temporary outage (503)");
    let harness = Harness::with(
        MemoryQueueStore::new(),
        dispatcher,
        true,
        QueueConfig::default().manual(),
    )
    .await;

    let doomed = harness
        .queue
        .enqueue_with_retries(new_report("Bad payload"), 1)
        .await;
    let flaky = harness
        .queue
        .enqueue_with_retries(new_report("Flaky"), 3)
        .await;
    harness.queue.process_queue().await;

    let flaky_before = harness.queue.get(&flaky).unwrap();
    assert_eq!(flaky_before.status, QueueItemStatus::Pending);
    assert_eq!(flaky_before.retry_count, 1);
    assert_eq!(
        harness.queue.get(&doomed).unwrap().status,
        QueueItemStatus::Failed
    );

    assert_eq!(harness.queue.retry_failed().await.unwrap(), 1);
    // A second call finds nothing left to reset.
    assert_eq!(harness.queue.retry_failed().await.unwrap(), 0);

    let doomed_after = harness.queue.get(&doomed).unwrap();
    assert_eq!(doomed_after.status, QueueItemStatus::Pending);
    assert_eq!(doomed_after.retry_count, 0);
    assert_eq!(doomed_after.error, None);
    assert_eq!(harness.queue.get(&flaky).unwrap(), flaky_before);
}

#[tokio::test]
async fn persisted_snapshot_tracks_every_mutation() {
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::always_failing(),
        true,
        QueueConfig::default().manual(),
    )
    .await;

    let id = harness
        .queue
        .enqueue_with_retries(new_report("Persist me"), 1)
        .await;
    assert_eq!(harness.reopen().await.items(), harness.queue.items());

    harness.queue.process_queue().await;
    let reopened = harness.reopen().await;
    let item = reopened.get(&id).unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);
    assert_eq!(item.retry_count, 1);

    harness.queue.retry_failed().await.unwrap();
    assert_eq!(
        harness.reopen().await.get(&id).unwrap().status,
        QueueItemStatus::Pending
    );

    assert_eq!(harness.queue.clear_all().await.unwrap(), 1);
    assert!(harness.reopen().await.items().is_empty());
}

#[tokio::test]
async fn interrupted_processing_item_is_pending_after_restart() {
    let now = chrono::Utc::now().timestamp_millis();
    let store = MemoryQueueStore::with_records(vec![json!({
        "id": format!("createReport_{now}_0a1b2c3d"),
        "operation": {
            "type": "createReport",
            "payload": {"description": "Mid-flight", "latitude": 1.0, "longitude": 2.0}
        },
        "timestamp": now,
        "retryCount": 1,
        "maxRetries": 3,
        "status": "processing"
    })]);

    let harness = Harness::with(
        store,
        RecordingDispatcher::default(),
        true,
        QueueConfig::default().manual(),
    )
    .await;

    let items = harness.queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, QueueItemStatus::Pending);
    assert_eq!(items[0].retry_count, 1);
    assert_eq!(harness.store.items()[0].status, QueueItemStatus::Pending);
}

#[tokio::test]
async fn items_past_retention_are_purged_regardless_of_status() {
    let now = chrono::Utc::now().timestamp_millis();
    let eight_days_ago = now - 8 * 24 * 60 * 60 * 1_000;
    let record = |id: &str, timestamp: i64, status: &str| {
        json!({
            "id": id,
            "operation": {"type": "syncData", "payload": {"scope": "reports"}},
            "timestamp": timestamp,
            "retryCount": 0,
            "maxRetries": 3,
            "status": status
        })
    };
    let store = MemoryQueueStore::with_records(vec![
        record("syncData_old_failed", eight_days_ago, "failed"),
        record("syncData_old_pending", eight_days_ago, "pending"),
        record("syncData_fresh", now, "pending"),
    ]);

    let harness = Harness::with(
        store,
        RecordingDispatcher::default(),
        false,
        QueueConfig::default().manual(),
    )
    .await;

    let ids: Vec<String> = harness
        .queue
        .items()
        .iter()
        .map(|item| item.id.to_string())
        .collect();
    assert_eq!(ids, vec!["syncData_fresh".to_string()]);
    assert_eq!(harness.store.records().len(), 1);
}

#[tokio::test]
async fn cleanup_uses_configured_retention() {
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::default(),
        false,
        QueueConfig::default()
            .manual()
            .with_retention(Duration::from_millis(1)),
    )
    .await;
    harness.queue.enqueue(sync_data()).await;

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.queue.cleanup_old_items().await.unwrap(), 1);
    assert!(harness.queue.queue_status().is_empty());
}

#[tokio::test]
async fn clear_completed_drops_only_completed_items() {
    let now = chrono::Utc::now().timestamp_millis();
    let record = |id: &str, status: &str| {
        json!({
            "id": id,
            "operation": {"type": "syncData", "payload": {"scope": "reports"}},
            "timestamp": now,
            "retryCount": 0,
            "maxRetries": 3,
            "status": status
        })
    };
    let store = MemoryQueueStore::with_records(vec![
        record("syncData_done", "completed"),
        record("syncData_waiting", "pending"),
    ]);
    let harness = Harness::with(
        store,
        RecordingDispatcher::default(),
        false,
        QueueConfig::default().manual(),
    )
    .await;

    assert_eq!(harness.queue.clear_completed().await.unwrap(), 1);
    assert_eq!(harness.queue.queue_status().total, 1);
    assert_eq!(harness.store.items()[0].id.as_str(), "syncData_waiting");
}

#[tokio::test]
async fn remove_reports_whether_item_existed() {
    let harness = Harness::new(false).await;
    let id = harness.queue.enqueue(sync_data()).await;

    assert!(harness.queue.remove(&id).await.unwrap());
    assert!(!harness.queue.remove(&id).await.unwrap());
}

#[tokio::test]
async fn enqueue_succeeds_even_when_store_rejects_writes() {
    let harness = Harness::new(false).await;
    harness.store.set_reject_writes(true);

    let id = harness.queue.enqueue(new_report("Disk full")).await;

    assert_eq!(harness.queue.get(&id).unwrap().status, QueueItemStatus::Pending);
    assert!(harness.store.records().is_empty());

    harness.store.set_reject_writes(false);
    harness.queue.enqueue(sync_data()).await;
    assert_eq!(harness.store.records().len(), 2);
}

#[tokio::test]
async fn housekeeping_surfaces_store_failures() {
    let harness = Harness::new(false).await;
    harness.queue.enqueue(sync_data()).await;
    harness.store.set_reject_writes(true);

    assert!(harness.queue.clear_all().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_drain_is_rejected_while_a_pass_runs() {
    let store: Arc<MemoryQueueStore> = Arc::new(MemoryQueueStore::new());
    let dispatcher = Arc::new(GateDispatcher::default());
    let queue = Arc::new(
        OfflineQueue::open(
            store,
            dispatcher.clone(),
            Arc::new(FakeProbe::new(true)),
            QueueConfig::default().manual(),
        )
        .await
        .unwrap(),
    );
    queue.enqueue(new_report("Only once")).await;

    let first = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.process_queue().await }
    });
    dispatcher.entered.notified().await;

    assert!(queue.is_draining());
    assert_eq!(queue.process_queue().await, DrainOutcome::AlreadyRunning);
    assert_eq!(queue.queue_status().processing, 1);

    dispatcher.release.notify_one();
    let outcome = first.await.unwrap();

    assert_eq!(
        outcome,
        DrainOutcome::Drained(DrainSummary {
            delivered: 1,
            requeued: 0,
            failed: 0,
        })
    );
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    assert!(!queue.is_draining());
}

#[tokio::test]
async fn enqueue_triggers_background_drain_when_enabled() {
    let config = QueueConfig {
        offline_retry_delay: None,
        follow_up_delay: None,
        ..QueueConfig::default()
    };
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::default(),
        true,
        config,
    )
    .await;

    harness.queue.enqueue(new_report("Auto delivered")).await;

    wait_until(|| harness.queue.queue_status().is_empty()).await;
    assert_eq!(
        harness.dispatcher.calls(),
        vec![QueueOperationKind::CreateReport]
    );
}

#[tokio::test(start_paused = true)]
async fn requeued_item_is_retried_by_follow_up_pass() {
    let dispatcher = RecordingDispatcher::default();
    dispatcher.fail_next("blip (502)");
    let config = QueueConfig {
        offline_retry_delay: None,
        follow_up_delay: Some(Duration::from_secs(1)),
        auto_drain: false,
        ..QueueConfig::default()
    };
    let harness = Harness::with(MemoryQueueStore::new(), dispatcher, true, config).await;
    harness.queue.enqueue(new_report("Retry me")).await;

    let outcome = harness.queue.process_queue().await;
    assert_eq!(
        outcome,
        DrainOutcome::Drained(DrainSummary {
            delivered: 0,
            requeued: 1,
            failed: 0,
        })
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    wait_until(|| harness.queue.queue_status().is_empty()).await;
    assert_eq!(harness.dispatcher.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn offline_pass_reschedules_itself() {
    let config = QueueConfig {
        offline_retry_delay: Some(Duration::from_secs(5)),
        follow_up_delay: None,
        auto_drain: false,
        ..QueueConfig::default()
    };
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::default(),
        false,
        config,
    )
    .await;
    harness.queue.enqueue(sync_data()).await;

    assert_eq!(harness.queue.process_queue().await, DrainOutcome::Offline);
    harness.probe.set_online(true);

    tokio::time::sleep(Duration::from_secs(6)).await;
    wait_until(|| harness.queue.queue_status().is_empty()).await;
    assert_eq!(harness.dispatcher.calls(), vec![QueueOperationKind::SyncData]);
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_drains_while_online_and_stops_on_request() {
    let harness = Harness::new(true).await;
    harness.queue.enqueue(new_report("Periodic")).await;

    harness
        .queue
        .start_periodic_sync(Duration::from_secs(10))
        .unwrap();
    assert!(harness.queue.is_periodic_sync_running());
    // Starting again replaces the timer instead of adding a second one.
    harness
        .queue
        .start_periodic_sync(Duration::from_secs(10))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    wait_until(|| harness.queue.queue_status().is_empty()).await;
    assert_eq!(harness.dispatcher.calls().len(), 1);
    assert_eq!(harness.probe.probes.load(Ordering::SeqCst), 2);

    harness.queue.stop_periodic_sync();
    assert!(!harness.queue.is_periodic_sync_running());

    harness.queue.enqueue(sync_data()).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.queue.queue_status().pending, 1);
}

#[tokio::test(start_paused = true)]
async fn offline_enqueues_share_one_deferred_drain() {
    let config = QueueConfig {
        offline_retry_delay: Some(Duration::from_secs(5)),
        follow_up_delay: None,
        auto_drain: true,
        ..QueueConfig::default()
    };
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::default(),
        false,
        config,
    )
    .await;
    for n in 0..10 {
        harness.queue.enqueue(new_report(&format!("Report {n}"))).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    let settled = harness.probe.probes.load(Ordering::SeqCst);
    assert!(settled <= 10, "{settled} probes before the first retry");

    tokio::time::sleep(Duration::from_secs(50)).await;
    let retries = harness.probe.probes.load(Ordering::SeqCst) - settled;
    assert!((9..=11).contains(&retries), "{retries} probes in 50s");
    assert_eq!(harness.queue.queue_status().pending, 10);
}

#[tokio::test(start_paused = true)]
async fn offline_pass_on_empty_queue_schedules_nothing() {
    let config = QueueConfig {
        offline_retry_delay: Some(Duration::from_secs(5)),
        follow_up_delay: None,
        auto_drain: false,
        ..QueueConfig::default()
    };
    let harness = Harness::with(
        MemoryQueueStore::new(),
        RecordingDispatcher::default(),
        false,
        config,
    )
    .await;

    assert_eq!(harness.queue.process_queue().await, DrainOutcome::Offline);
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(harness.probe.probes.load(Ordering::SeqCst), 1);
}
