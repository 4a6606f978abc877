use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncRunStatus {
    /// Terminal statuses are final; no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
}

impl SyncTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Running totals of one sync run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCounters {
    pub total_entries: i64,
    pub users_created: i64,
    pub users_updated: i64,
    pub users_deactivated: i64,
    pub errors: i64,
    pub warnings: i64,
}

impl SyncCounters {
    /// Users touched by successfully applied actions.
    pub fn synced_users(&self) -> i64 {
        self.users_created + self.users_updated + self.users_deactivated
    }
}

/// A record of a single directory sync run.
///
/// Everything except `id`, `trigger` and `started_at` is written once, at the
/// terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRun {
    pub id: String,
    pub trigger: SyncTrigger,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: SyncCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncRun {
    /// Wall-clock duration of a finished run.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Aggregate counters across every finished run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRunTotals {
    pub total_runs: i64,
    pub completed_runs: i64,
    pub failed_runs: i64,
    pub cancelled_runs: i64,
    pub users_created: i64,
    pub users_updated: i64,
    pub users_deactivated: i64,
    pub errors: i64,
    pub warnings: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sync_run_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SyncRunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&SyncRunStatus::Completed).unwrap(),
            "\"completed\""
        );
        for status in [
            SyncRunStatus::Pending,
            SyncRunStatus::Running,
            SyncRunStatus::Completed,
            SyncRunStatus::Failed,
            SyncRunStatus::Cancelled,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn terminal_states_are_final() {
        let all = [
            SyncRunStatus::Pending,
            SyncRunStatus::Running,
            SyncRunStatus::Completed,
            SyncRunStatus::Failed,
            SyncRunStatus::Cancelled,
        ];
        for from in all.into_iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn running_only_moves_to_terminal() {
        assert!(SyncRunStatus::Pending.can_transition_to(SyncRunStatus::Running));
        assert!(SyncRunStatus::Running.can_transition_to(SyncRunStatus::Completed));
        assert!(SyncRunStatus::Running.can_transition_to(SyncRunStatus::Cancelled));
        assert!(!SyncRunStatus::Running.can_transition_to(SyncRunStatus::Pending));
        assert!(!SyncRunStatus::Pending.can_transition_to(SyncRunStatus::Completed));
    }

    #[test]
    fn sync_run_serializes_counters_flat() {
        let run = SyncRun {
            id: "run-001".into(),
            trigger: SyncTrigger::Scheduled,
            status: SyncRunStatus::Completed,
            started_at: Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap(),
            completed_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 2, 5, 0).unwrap()),
            counters: SyncCounters {
                total_entries: 120,
                users_created: 3,
                users_updated: 4,
                users_deactivated: 1,
                errors: 0,
                warnings: 2,
            },
            error_message: None,
        };
        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["users_created"], 3);
        assert_eq!(value["trigger"], "scheduled");
        assert!(value.get("error_message").is_none());
        assert_eq!(run.duration(), Some(chrono::Duration::minutes(5)));
        assert_eq!(run.counters.synced_users(), 8);
    }
}
