use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DirectoryConfig;
use crate::error::Result;
use crate::models::{
    sync::{SyncCounters, SyncRun, SyncRunStatus, SyncRunTotals, SyncTrigger},
    sync_log::{LogFilter, NewSyncLogEntry, SyncLogEntry},
    user::{LocalUserRecord, NewExternalUser, NewLocalUser, UserChanges},
};

/// The local user store, keyed by external identifier for directory-sourced users.
#[async_trait]
pub trait LocalUserRepository: Send + Sync {
    async fn create_local_user(&self, user: &NewLocalUser) -> Result<LocalUserRecord>;
    /// Fails if a user with the same external identifier already exists.
    async fn create_external_user(
        &self,
        user: &NewExternalUser,
        synced_at: DateTime<Utc>,
    ) -> Result<LocalUserRecord>;
    async fn update_external_user(
        &self,
        id: i64,
        changes: &UserChanges,
        synced_at: DateTime<Utc>,
    ) -> Result<LocalUserRecord>;
    async fn deactivate_user(&self, id: i64, synced_at: DateTime<Utc>) -> Result<()>;
    async fn get_user(&self, id: i64) -> Result<Option<LocalUserRecord>>;
    async fn get_user_by_external_id(&self, external_id: &str)
        -> Result<Option<LocalUserRecord>>;
    async fn list_users(&self) -> Result<Vec<LocalUserRecord>>;
    /// Users previously sourced from the directory, active or not.
    async fn list_external_users(&self) -> Result<Vec<LocalUserRecord>>;
}

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Insert a new run in `Pending` status.
    async fn create_sync_run(&self, trigger: SyncTrigger) -> Result<SyncRun>;
    async fn mark_sync_run_running(&self, id: &str) -> Result<()>;
    /// Write the terminal summary. Returns `false` if the run was already finished.
    async fn finish_sync_run(
        &self,
        id: &str,
        status: SyncRunStatus,
        counters: &SyncCounters,
        error_message: Option<&str>,
    ) -> Result<bool>;
    async fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>>;
    async fn get_latest_finished_sync_run(&self) -> Result<Option<SyncRun>>;
    async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>>;
    async fn sync_run_totals(&self) -> Result<SyncRunTotals>;
}

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    async fn append_sync_log(&self, entry: &NewSyncLogEntry) -> Result<SyncLogEntry>;
    /// Matching entries newest-first, plus the total number of matches.
    async fn query_sync_logs(&self, filter: &LogFilter) -> Result<(Vec<SyncLogEntry>, i64)>;
    async fn get_sync_log(&self, id: i64) -> Result<Option<SyncLogEntry>>;
    async fn delete_sync_logs_before(&self, before: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait DirectoryConfigRepository: Send + Sync {
    async fn get_directory_config(&self) -> Result<Option<DirectoryConfig>>;
    async fn save_directory_config(&self, config: &DirectoryConfig) -> Result<()>;
}

/// Combined repository trait for everything the sync engine persists.
pub trait DirsyncRepository:
    LocalUserRepository + SyncRunRepository + SyncLogRepository + DirectoryConfigRepository
{
}
