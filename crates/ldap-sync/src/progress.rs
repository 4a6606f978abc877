//! Live progress of the active run, published as immutable snapshots.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use dirsync_core::models::status::{
    humanize_duration, percentage, SyncProgress, SyncStatus, STATUS_RUNNING,
};
use dirsync_core::models::sync::SyncCounters;

pub const STEP_STARTING: &str = "starting";
pub const STEP_FETCHING: &str = "fetching directory entries";
pub const STEP_PLANNING: &str = "planning changes";
pub const STEP_APPLYING: &str = "applying changes";
pub const STEP_FINALIZING: &str = "finalizing";

#[derive(Debug, Clone)]
struct ProgressState {
    step: &'static str,
    processed: i64,
    total: i64,
    counters: SyncCounters,
}

/// Progress of one run. The job is the only writer; readers never block it.
#[derive(Debug)]
pub struct ProgressTracker {
    run_id: String,
    started_at: DateTime<Utc>,
    state: ArcSwap<ProgressState>,
}

impl ProgressTracker {
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            state: ArcSwap::from_pointee(ProgressState {
                step: STEP_STARTING,
                processed: 0,
                total: 0,
                counters: SyncCounters::default(),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn set_step(&self, step: &'static str) {
        self.update(|s| s.step = step);
    }

    /// Publish counters while entries are still being read.
    pub fn fetched(&self, counters: SyncCounters) {
        self.update(|s| s.counters = counters);
    }

    /// Begin applying changes for `total` directory entries, `processed` of
    /// which need no write.
    pub fn start_applying(&self, total: i64, processed: i64, counters: SyncCounters) {
        self.update(|s| {
            s.step = STEP_APPLYING;
            s.total = total;
            s.processed = processed;
            s.counters = counters;
        });
    }

    pub fn record(&self, processed: i64, counters: SyncCounters) {
        self.update(|s| {
            s.processed = processed;
            s.counters = counters;
        });
    }

    pub fn counters(&self) -> SyncCounters {
        self.state.load().counters
    }

    fn update(&self, f: impl FnOnce(&mut ProgressState)) {
        let mut next = ProgressState::clone(&self.state.load());
        f(&mut next);
        self.state.store(Arc::new(next));
    }

    /// Progress snapshot as of `now`.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> SyncProgress {
        let state = self.state.load();
        SyncProgress {
            is_running: true,
            progress: percentage(state.processed, state.total),
            processed_items: state.processed,
            total_items: state.total,
            sync_id: Some(self.run_id.clone()),
            current_step: Some(state.step.to_string()),
            estimated_time: estimate_remaining(
                now - self.started_at,
                state.processed,
                state.total,
            ),
            start_time: Some(self.started_at),
        }
    }

    pub fn snapshot(&self) -> SyncProgress {
        self.snapshot_at(Utc::now())
    }

    /// Status view of the run while it is in flight.
    pub fn status(&self) -> SyncStatus {
        let counters = self.counters();
        SyncStatus {
            status: STATUS_RUNNING.into(),
            is_running: true,
            sync_id: Some(self.run_id.clone()),
            total_users: counters.total_entries,
            synced_users: counters.synced_users(),
            errors: counters.errors,
            warnings: counters.warnings,
            last_sync_duration: None,
            last_sync_time: None,
        }
    }
}

/// Remaining time, extrapolated from the average time per processed item.
fn estimate_remaining(elapsed: chrono::Duration, processed: i64, total: i64) -> Option<String> {
    if processed <= 0 || total <= processed {
        return None;
    }
    let per_item_ms = elapsed.num_milliseconds().max(0) / processed;
    let remaining = chrono::Duration::milliseconds(per_item_ms * (total - processed));
    Some(humanize_duration(remaining))
}
