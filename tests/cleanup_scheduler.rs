//! Scheduler behavior against instrumented stores: timing, overlapping runs,
//! batch concurrency and failure isolation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use heatmap_reconciler::{
    CleanupConfig, CleanupScheduler, DetectionRecord, DetectionStore, GeoPoint, HeatmapConfig,
    MemoryDetectionStore, ReconcileError, Result, SchedulerState,
};

const LAT: f64 = 22.6950;
const LNG: f64 = 88.3794;

fn pairs(n: usize) -> Vec<DetectionRecord> {
    (0..n)
        .flat_map(|i| {
            let lat = LAT + i as f64 * 0.1;
            vec![
                DetectionRecord::new(format!("A{:02}", i), GeoPoint::new(lat, LNG), vec![0.9]),
                DetectionRecord::new(format!("C{:02}", i), GeoPoint::new(lat, LNG), vec![0.0]),
            ]
        })
        .collect()
}

/// Yields after taking its snapshot and inside every delete, so concurrent
/// runs and batched deletes interleave deterministically.
#[derive(Default)]
struct InterleavingStore {
    inner: MemoryDetectionStore,
    fail_reads: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InterleavingStore {
    fn with_records(records: Vec<DetectionRecord>) -> Self {
        Self {
            inner: MemoryDetectionStore::with_records(records),
            ..Default::default()
        }
    }
}

impl DetectionStore for InterleavingStore {
    async fn list_detections(&self) -> Result<Vec<DetectionRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ReconcileError::StoreRead {
                message: "store unavailable".to_string(),
            });
        }
        let records = self.inner.list_detections().await?;
        tokio::task::yield_now().await;
        Ok(records)
    }

    async fn delete_detection(&self, id: &str) -> Result<bool> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let deleted = self.inner.delete_detection(id).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        deleted
    }
}

#[tokio::test(start_paused = true)]
async fn start_runs_immediately_then_on_interval() {
    let store = Arc::new(MemoryDetectionStore::with_records(pairs(1)));
    let scheduler = CleanupScheduler::new(Arc::clone(&store), HeatmapConfig::default());

    let handle = scheduler.start(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.totals().runs, 1);
    assert_eq!(scheduler.stats().unwrap().removed_count, 1);
    assert!(store.get("A00").await.is_none());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(scheduler.totals().runs, 2);
    assert!(scheduler.stats().unwrap().is_noop());

    handle.stop();
    assert_eq!(handle.state(), SchedulerState::Stopped);
    handle.join().await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(scheduler.totals().runs, 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_schedule() {
    let scheduler = CleanupScheduler::new(
        Arc::new(MemoryDetectionStore::new()),
        HeatmapConfig::default(),
    );

    let handle = scheduler.start_default();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.totals().runs, 1);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(scheduler.totals().runs, 1);
}

#[tokio::test(start_paused = true)]
async fn scheduled_read_failure_keeps_schedule_alive() {
    let store = Arc::new(InterleavingStore::with_records(pairs(1)));
    store.fail_reads.store(true, Ordering::SeqCst);
    let scheduler = CleanupScheduler::new(Arc::clone(&store), HeatmapConfig::default());

    let handle = scheduler.start(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.totals().failed_runs, 1);
    assert!(handle.is_running());

    // Store recovers; the next tick cleans up
    store.fail_reads.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(scheduler.totals().runs, 1);
    assert_eq!(scheduler.totals().removed, 1);

    handle.join().await;
}

#[tokio::test]
async fn overlapping_runs_delete_once() {
    let store = Arc::new(InterleavingStore::with_records(pairs(1)));
    let scheduler = CleanupScheduler::new(Arc::clone(&store), HeatmapConfig::default());

    // Both runs snapshot the store before either deletes
    let (first, second) = tokio::join!(scheduler.run_once(), scheduler.run_once());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.removed_count + second.removed_count, 1);
    assert_eq!(first.already_absent_count + second.already_absent_count, 1);
    assert_eq!(first.error_count + second.error_count, 0);
    assert!(store.inner.get("A00").await.is_none());
    assert!(store.inner.get("C00").await.is_some());
}

#[tokio::test]
async fn deletes_bounded_by_batch_size() {
    let store = Arc::new(InterleavingStore::with_records(pairs(10)));
    let config = HeatmapConfig {
        cleanup: CleanupConfig {
            batch_size: 3,
            ..Default::default()
        },
        ..Default::default()
    };
    let scheduler = CleanupScheduler::new(Arc::clone(&store), config);

    let stats = scheduler.run_once().await.unwrap();
    assert_eq!(stats.removed_count, 10);

    let max = store.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "{} deletes in flight", max);
    assert!(max > 1, "deletes within a batch should overlap");
    assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn documents_inserted_between_runs_are_picked_up() {
    let store = Arc::new(MemoryDetectionStore::new());
    let scheduler = CleanupScheduler::new(Arc::clone(&store), HeatmapConfig::default());

    let active = store
        .insert_document(&serde_json::json!({
            "confidence_scores": [0.75],
            "location": { "latitude": LAT, "longitude": LNG }
        }))
        .await
        .unwrap();
    assert!(scheduler.run_once().await.unwrap().is_noop());

    store
        .insert_document(&serde_json::json!({
            "confidence_scores": [0.0],
            "location": { "latitude": LAT + 0.001, "longitude": LNG - 0.001 }
        }))
        .await
        .unwrap();
    let stats = scheduler.run_once().await.unwrap();
    assert_eq!(stats.removed_count, 1);
    assert!(store.get(&active).await.is_none());
}
