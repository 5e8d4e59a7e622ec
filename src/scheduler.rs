//! # Cleanup Scheduler
//!
//! Applies reconciliation to a live [`DetectionStore`]: read a snapshot,
//! reconcile it, delete retired detections in bounded batches.
//!
//! ## Failure handling
//!
//! - A failed read aborts the run and is returned to the caller.
//! - A failed delete is counted in `error_count`; the rest of the run continues.
//! - Deleting an id that is already gone counts as done, not as an error.
//!
//! ## Scheduling
//!
//! [`CleanupScheduler::start`] runs immediately and then on every tick. Each
//! tick spawns its own run, so a slow run can overlap the next one. That is
//! safe because deletes are idempotent and every run works from its own
//! snapshot. Stopping only prevents future ticks; a run already in flight
//! finishes normally.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{ReconcileError, Result};
use crate::heatmap::StoreCensus;
use crate::reconciler::reconcile;
use crate::store::DetectionStore;
use crate::{CleanupConfig, HeatmapConfig, ProximityConfig};

/// Statistics for a single cleanup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStats {
    /// Records read from the store
    pub total_processed: usize,
    /// Valid cleaned signals found
    pub cleaned_count: usize,
    /// Active detections actually deleted
    pub removed_count: usize,
    /// Cleaned signals with nothing nearby to retire
    pub ignored_count: usize,
    /// Retirements whose target was already gone (e.g. an overlapping run)
    pub already_absent_count: usize,
    /// Records skipped for missing or sentinel coordinates
    pub invalid_count: usize,
    /// Deletes that failed
    pub error_count: usize,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

impl CleanupStats {
    /// True when the run deleted nothing and hit no errors.
    pub fn is_noop(&self) -> bool {
        self.removed_count == 0 && self.error_count == 0
    }
}

/// Running totals across every run of one scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupTotals {
    /// Runs that completed (possibly with per-record errors)
    pub runs: u64,
    /// Runs aborted by a store read failure
    pub failed_runs: u64,
    pub removed: u64,
    pub errors: u64,
}

/// Lifecycle of a scheduled cleanup. There is no paused state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Handle to a recurring cleanup started with [`CleanupScheduler::start`].
///
/// Dropping the handle also stops the schedule.
#[derive(Debug)]
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop future scheduled runs. Calling this more than once is a no-op.
    pub fn stop(&self) {
        let was_stopped = self.shutdown.send_replace(true);
        if !was_stopped {
            info!("[CleanupScheduler] Stopping automatic cleanup");
        }
    }

    pub fn state(&self) -> SchedulerState {
        if *self.shutdown.borrow() || self.task.is_finished() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Wait for the tick loop to exit after [`stop`](Self::stop).
    ///
    /// Runs already spawned by earlier ticks are not awaited.
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!("[CleanupScheduler] Tick loop ended abnormally: {}", e);
        }
    }
}

struct Inner<S> {
    store: Arc<S>,
    proximity: ProximityConfig,
    cleanup: CleanupConfig,
    last_stats: Mutex<Option<CleanupStats>>,
    totals: Mutex<CleanupTotals>,
}

/// Runs reconciliation against a store, on demand or on a timer.
pub struct CleanupScheduler<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CleanupScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DetectionStore + 'static> CleanupScheduler<S> {
    pub fn new(store: Arc<S>, config: HeatmapConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                proximity: config.proximity,
                cleanup: config.cleanup,
                last_stats: Mutex::new(None),
                totals: Mutex::new(CleanupTotals::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Read, reconcile, and apply deletions once.
    pub async fn run_once(&self) -> Result<CleanupStats> {
        let started = Instant::now();
        debug!("[CleanupScheduler] Starting cleanup run");

        let records = match self.inner.store.list_detections().await {
            Ok(records) => records,
            Err(e) => {
                self.record_failed_run();
                let err = match e {
                    ReconcileError::StoreRead { .. } => e,
                    other => ReconcileError::StoreRead {
                        message: other.to_string(),
                    },
                };
                error!("[CleanupScheduler] Cleanup aborted: {}", err);
                return Err(err);
            }
        };

        let result = reconcile(&records, &self.inner.proximity);
        let removed_ids = result.removed_ids();

        let mut stats = CleanupStats {
            total_processed: records.len(),
            cleaned_count: result.cleaned_count(),
            removed_count: 0,
            ignored_count: result.ignored_count(),
            already_absent_count: 0,
            invalid_count: result.invalid_count,
            error_count: 0,
            timestamp: Utc::now(),
        };

        // Batches run one after another; deletes within a batch run concurrently
        let batch_size = self.inner.cleanup.batch_size.max(1);
        for batch in removed_ids.chunks(batch_size) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|id| self.inner.store.delete_detection(id)),
            )
            .await;

            for (id, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(true) => stats.removed_count += 1,
                    Ok(false) => {
                        debug!("[CleanupScheduler] {} was already removed", id);
                        stats.already_absent_count += 1;
                    }
                    Err(e) if e.is_not_found() => {
                        debug!("[CleanupScheduler] {} was already removed", id);
                        stats.already_absent_count += 1;
                    }
                    Err(e) => {
                        warn!("[CleanupScheduler] Failed to delete {}: {}", id, e);
                        stats.error_count += 1;
                    }
                }
            }
            debug!("[CleanupScheduler] Committed batch of {} deletions", batch.len());
        }

        stats.timestamp = Utc::now();
        self.record_run(&stats);

        if stats.is_noop() {
            info!(
                "[CleanupScheduler] Nothing to clean ({} records checked in {:?})",
                stats.total_processed,
                started.elapsed()
            );
        } else {
            info!(
                "[CleanupScheduler] Cleanup completed in {:?}: {} processed, {} cleaned, {} removed, {} errors",
                started.elapsed(),
                stats.total_processed,
                stats.cleaned_count,
                stats.removed_count,
                stats.error_count
            );
        }

        Ok(stats)
    }

    /// Run now, then every `interval`, until the returned handle is stopped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, interval: Duration) -> CleanupHandle {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();

        info!(
            "[CleanupScheduler] Starting automatic cleanup (every {:?})",
            interval
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    // Also fires if the handle was dropped
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let run = scheduler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = run.run_once().await {
                                error!("[CleanupScheduler] Scheduled cleanup failed: {}", e);
                            }
                        });
                    }
                }
            }

            info!("[CleanupScheduler] Automatic cleanup stopped");
        });

        CleanupHandle { shutdown, task }
    }

    /// Start with the configured interval.
    pub fn start_default(&self) -> CleanupHandle {
        self.start(self.inner.cleanup.interval())
    }

    /// Stop a running schedule. Idempotent.
    pub fn stop(&self, handle: &CleanupHandle) {
        handle.stop();
    }

    /// Stats of the last completed run, without triggering a new one.
    pub fn stats(&self) -> Option<CleanupStats> {
        self.inner
            .last_stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn totals(&self) -> CleanupTotals {
        *self.inner.totals.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count what is in the store right now, without reconciling.
    pub async fn census(&self) -> Result<StoreCensus> {
        let records = self.inner.store.list_detections().await?;
        Ok(StoreCensus::from_records(&records))
    }

    fn record_run(&self, stats: &CleanupStats) {
        {
            let mut totals = self.inner.totals.lock().unwrap_or_else(|e| e.into_inner());
            totals.runs += 1;
            totals.removed += stats.removed_count as u64;
            totals.errors += stats.error_count as u64;
        }
        *self
            .inner
            .last_stats
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(stats.clone());
    }

    fn record_failed_run(&self) {
        self.inner
            .totals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failed_runs += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================
