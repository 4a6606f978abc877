//! Durable, queryable sync log.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use dirsync_core::db::repository::SyncLogRepository;
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::sync_log::{LogFilter, NewSyncLogEntry, SyncLogEntry};

/// Appends and retrieves sync log entries. Every append is written to storage
/// before it returns.
pub struct SyncLogSink<R: SyncLogRepository> {
    repo: Arc<R>,
}

impl<R: SyncLogRepository> Clone for SyncLogSink<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R: SyncLogRepository> SyncLogSink<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn append(&self, entry: NewSyncLogEntry) -> Result<SyncLogEntry> {
        let stored = self.repo.append_sync_log(&entry).await?;
        debug!(
            run_id = %stored.run_id,
            log_id = stored.id,
            level = %stored.level,
            message = %stored.message,
            "sync log entry written"
        );
        Ok(stored)
    }

    /// Matching entries newest-first, plus the total match count.
    pub async fn query(&self, filter: &LogFilter) -> Result<(Vec<SyncLogEntry>, i64)> {
        self.repo.query_sync_logs(filter).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<SyncLogEntry> {
        self.repo
            .get_sync_log(id)
            .await?
            .ok_or_else(|| DirsyncError::NotFound(format!("sync log entry {id}")))
    }

    /// Delete entries older than `days`. Zero keeps everything.
    pub async fn purge_older_than(&self, days: u32) -> Result<u64> {
        if days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let deleted = self.repo.delete_sync_logs_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, retention_days = days, "purged old sync log entries");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_repo;
    use dirsync_core::models::sync_log::LogLevel;
    use dirsync_core::db::repository::SyncRunRepository;
    use dirsync_core::models::sync::SyncTrigger;

    #[tokio::test]
    async fn append_then_get_by_id() {
        let repo = memory_repo().await;
        let run = repo.create_sync_run(SyncTrigger::Manual).await.unwrap();
        let sink = SyncLogSink::new(repo);

        let stored = sink
            .append(NewSyncLogEntry::warning(&run.id, "duplicate external id u1"))
            .await
            .unwrap();
        let fetched = sink.get_by_id(stored.id).await.unwrap();
        assert_eq!(fetched.level, LogLevel::Warning);
        assert_eq!(fetched.run_id, run.id);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let sink = SyncLogSink::new(memory_repo().await);
        assert!(matches!(
            sink.get_by_id(12345).await,
            Err(DirsyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn query_filters_by_level_and_run() {
        let repo = memory_repo().await;
        let run = repo.create_sync_run(SyncTrigger::Manual).await.unwrap();
        let other = repo.create_sync_run(SyncTrigger::Scheduled).await.unwrap();
        let sink = SyncLogSink::new(repo);

        sink.append(NewSyncLogEntry::info(&run.id, "created user alice").with_username("alice"))
            .await
            .unwrap();
        sink.append(NewSyncLogEntry::error(&run.id, "failed to update user bob").with_username("bob"))
            .await
            .unwrap();
        sink.append(NewSyncLogEntry::error(&other.id, "directory sync failed"))
            .await
            .unwrap();

        let (entries, total) = sink
            .query(&LogFilter {
                level: Some(LogLevel::Error),
                run_id: Some(run.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries[0].username.as_deref(), Some("bob"));

        let (_, total) = sink.query(&LogFilter::default()).await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn append_surfaces_storage_errors() {
        let sink = SyncLogSink::new(memory_repo().await);
        // no such run: the foreign key rejects the write
        assert!(matches!(
            sink.append(NewSyncLogEntry::error("missing-run", "lost")).await,
            Err(DirsyncError::Database(_))
        ));
        let (_, total) = sink.query(&LogFilter::default()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn purge_respects_retention() {
        let repo = memory_repo().await;
        let run = repo.create_sync_run(SyncTrigger::Manual).await.unwrap();
        let sink = SyncLogSink::new(repo);
        sink.append(NewSyncLogEntry::info(&run.id, "fresh"))
            .await
            .unwrap();

        assert_eq!(sink.purge_older_than(0).await.unwrap(), 0);
        assert_eq!(sink.purge_older_than(30).await.unwrap(), 0);
        let (_, total) = sink.query(&LogFilter::default()).await.unwrap();
        assert_eq!(total, 1);
    }
}
