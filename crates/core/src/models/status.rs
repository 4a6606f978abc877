//! Derived view objects for the control surface. Never a source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sync::{SyncRun, SyncRunTotals};

pub const STATUS_NEVER_SYNCED: &str = "never_synced";
pub const STATUS_RUNNING: &str = "running";

/// Overall sync status: the active run's running totals, or the most recent
/// finished run when nothing is running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    pub status: String,
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub total_users: i64,
    pub synced_users: i64,
    pub errors: i64,
    pub warnings: i64,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn never_synced() -> Self {
        Self {
            status: STATUS_NEVER_SYNCED.into(),
            is_running: false,
            sync_id: None,
            total_users: 0,
            synced_users: 0,
            errors: 0,
            warnings: 0,
            last_sync_duration: None,
            last_sync_time: None,
        }
    }

    /// Status of a finished run.
    pub fn from_finished_run(run: &SyncRun) -> Self {
        Self {
            status: run.status.as_str().into(),
            is_running: false,
            sync_id: Some(run.id.clone()),
            total_users: run.counters.total_entries,
            synced_users: run.counters.synced_users(),
            errors: run.counters.errors,
            warnings: run.counters.warnings,
            last_sync_duration: run.duration().map(|d| d.num_seconds()),
            last_sync_time: run.completed_at,
        }
    }
}

/// Live progress of the active run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncProgress {
    pub is_running: bool,
    /// 0 to 100.
    pub progress: u8,
    pub processed_items: i64,
    pub total_items: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl SyncProgress {
    /// Progress when no run is active.
    pub fn idle() -> Self {
        Self {
            is_running: false,
            progress: 0,
            processed_items: 0,
            total_items: 0,
            sync_id: None,
            current_step: None,
            estimated_time: None,
            start_time: None,
        }
    }
}

/// Percentage of `processed` over `total`, clamped to 0..=100; 0 when the total is unknown.
pub fn percentage(processed: i64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    let pct = processed.clamp(0, total) * 100 / total;
    u8::try_from(pct).unwrap_or(100)
}

/// Rolled-up counters across historical runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatistics {
    #[serde(flatten)]
    pub totals: SyncRunTotals,
    pub recent_runs: Vec<SyncRun>,
}

/// Returned when a run has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStarted {
    pub run_id: String,
    /// Advisory only.
    pub estimated_duration: String,
}

/// Outcome of a successful connection test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionTestReport {
    pub url: String,
    pub message: String,
    pub elapsed_ms: i64,
}

/// Render a duration as a short human-readable string, e.g. `2m 05s`.
pub fn humanize_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
