//! Shared fixtures for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use dirsync_core::config::{AttributeMapping, ConnectionConfig, DirectoryConfig};
use dirsync_core::db::repository::{
    DirectoryConfigRepository, DirsyncRepository, LocalUserRepository, SyncLogRepository,
    SyncRunRepository,
};
use dirsync_core::db::sqlite::SqliteRepository;
use dirsync_core::db::DatabasePool;
use dirsync_core::directory::{DirectoryClient, EntryStream};
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::directory::DirectoryEntry;
use dirsync_core::models::sync::{
    SyncCounters, SyncRun, SyncRunStatus, SyncRunTotals, SyncTrigger,
};
use dirsync_core::models::sync_log::{LogFilter, LogLevel, NewSyncLogEntry, SyncLogEntry};
use dirsync_core::models::user::{LocalUserRecord, NewExternalUser, NewLocalUser, UserChanges};

pub(crate) async fn memory_repo() -> Arc<SqliteRepository> {
    let DatabasePool::Sqlite(pool) = DatabasePool::new_sqlite_memory().await.unwrap();
    Arc::new(SqliteRepository::new(pool))
}

pub(crate) fn sample_config() -> DirectoryConfig {
    DirectoryConfig {
        enabled: true,
        sync_interval_minutes: Some(60),
        connection: ConnectionConfig {
            url: "ldap://ldap.example.com:389".into(),
            bind_dn: "cn=admin,dc=example,dc=com".into(),
            bind_password: "secret".into(),
            base_dn: "ou=people,dc=example,dc=com".into(),
            user_filter: "(objectClass=person)".into(),
            tls_verify: true,
            starttls: false,
            timeout_secs: 5,
            page_size: 100,
        },
        attributes: AttributeMapping::default(),
    }
}

pub(crate) fn entry(external_id: &str, username: &str, email: &str) -> DirectoryEntry {
    DirectoryEntry {
        external_id: external_id.into(),
        username: Some(username.into()),
        email: Some(email.into()),
        display_name: None,
        enabled: true,
    }
}

pub(crate) fn external_user(
    id: i64,
    external_id: &str,
    username: &str,
    email: &str,
) -> LocalUserRecord {
    LocalUserRecord {
        id,
        external_id: Some(external_id.into()),
        username: username.into(),
        email: Some(email.into()),
        display_name: None,
        active: true,
        is_external: true,
        last_synced_at: None,
    }
}

pub(crate) async fn seed_external(
    repo: &impl LocalUserRepository,
    external_id: &str,
    username: &str,
    email: &str,
) -> LocalUserRecord {
    repo.create_external_user(
        &NewExternalUser {
            external_id: external_id.into(),
            username: username.into(),
            email: Some(email.into()),
            display_name: None,
            active: true,
        },
        Utc::now(),
    )
    .await
    .unwrap()
}

pub(crate) async fn seed_local(repo: &impl LocalUserRepository, username: &str) -> LocalUserRecord {
    repo.create_local_user(&NewLocalUser {
        username: username.into(),
        email: None,
        display_name: None,
    })
    .await
    .unwrap()
}

/// In-memory directory with optional failure and a gate that holds the fetch open.
#[derive(Default)]
pub(crate) struct MockDirectory {
    entries: Mutex<Vec<DirectoryEntry>>,
    /// Fail the fetch after yielding this many entries.
    fail_after: Mutex<Option<usize>>,
    connection_error: Mutex<Option<u32>>,
    gate: Option<Arc<Notify>>,
    pub fetches: AtomicUsize,
}

impl MockDirectory {
    pub(crate) fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    /// Each fetch waits for one `notify_one` on the returned handle before yielding.
    pub(crate) fn gated(entries: Vec<DirectoryEntry>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let dir = Self {
            entries: Mutex::new(entries),
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (dir, gate)
    }

    pub(crate) fn set_entries(&self, entries: Vec<DirectoryEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub(crate) fn fail_after(&self, n: usize) {
        *self.fail_after.lock().unwrap() = Some(n);
    }

    pub(crate) fn refuse_connections(&self, code: u32) {
        *self.connection_error.lock().unwrap() = Some(code);
    }

    fn scripted_stream(
        &self,
        entries: Vec<DirectoryEntry>,
        fail_after: Option<usize>,
    ) -> impl Stream<Item = Result<DirectoryEntry>> + Send + '_ {
        async_stream::try_stream! {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            for (i, e) in entries.into_iter().enumerate() {
                if fail_after == Some(i) {
                    Err::<(), _>(busy(i))?;
                }
                yield e;
            }
            if let Some(n) = fail_after {
                Err::<(), _>(busy(n))?;
            }
        }
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn test_connection(&self, _config: &DirectoryConfig) -> Result<()> {
        match *self.connection_error.lock().unwrap() {
            Some(code) => Err(DirsyncError::Directory {
                code: Some(code),
                message: "LDAP bind rejected".into(),
            }),
            None => Ok(()),
        }
    }

    fn fetch_entries<'a>(&'a self, _config: &'a DirectoryConfig) -> EntryStream<'a> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap().clone();
        let fail_after = *self.fail_after.lock().unwrap();
        Box::pin(self.scripted_stream(entries, fail_after))
    }
}

fn busy(after: usize) -> DirsyncError {
    DirsyncError::Directory {
        code: Some(51),
        message: format!("server busy after {after} entries"),
    }
}

/// SQLite-backed repository with injectable failures.
pub(crate) struct ScriptedRepo {
    pub inner: SqliteRepository,
    fail_usernames: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    user_writes: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    finish_failures: AtomicUsize,
    failing_log_level: Mutex<Option<LogLevel>>,
    run_creation_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedRepo {
    pub(crate) async fn new() -> Arc<Self> {
        let DatabasePool::Sqlite(pool) = DatabasePool::new_sqlite_memory().await.unwrap();
        Arc::new(Self {
            inner: SqliteRepository::new(pool),
            fail_usernames: Mutex::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
            user_writes: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
            finish_failures: AtomicUsize::new(0),
            failing_log_level: Mutex::new(None),
            run_creation_gate: Mutex::new(None),
        })
    }

    /// Writes for this username fail with a database error.
    pub(crate) fn fail_writes_for(&self, username: &str) {
        self.fail_usernames.lock().unwrap().insert(username.into());
    }

    pub(crate) fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    /// Cancel `token` right after the n-th successful user write.
    pub(crate) fn cancel_after_writes(&self, n: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((n, token));
    }

    /// The next `n` terminal run writes fail; `usize::MAX` fails them all.
    pub(crate) fn fail_finishes(&self, n: usize) {
        self.finish_failures.store(n, Ordering::SeqCst);
    }

    /// Log appends at this level fail with a database error.
    pub(crate) fn fail_log_appends(&self, level: LogLevel) {
        *self.failing_log_level.lock().unwrap() = Some(level);
    }

    /// Hold every run creation until the returned handle is notified.
    pub(crate) fn hold_run_creation(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.run_creation_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn user_writes(&self) -> usize {
        self.user_writes.load(Ordering::SeqCst)
    }

    fn check(&self, username: &str) -> Result<()> {
        if self.fail_usernames.lock().unwrap().contains(username) {
            return Err(DirsyncError::Database(sqlx::Error::Protocol(format!(
                "constraint failed for {username}"
            ))));
        }
        Ok(())
    }

    fn wrote(&self) {
        let n = self.user_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, ref token)) = *self.cancel_after.lock().unwrap() {
            if n == after {
                token.cancel();
            }
        }
    }
}

impl DirsyncRepository for ScriptedRepo {}

#[async_trait]
impl LocalUserRepository for ScriptedRepo {
    async fn create_local_user(&self, user: &NewLocalUser) -> Result<LocalUserRecord> {
        self.inner.create_local_user(user).await
    }

    async fn create_external_user(
        &self,
        user: &NewExternalUser,
        synced_at: DateTime<Utc>,
    ) -> Result<LocalUserRecord> {
        self.check(&user.username)?;
        let created = self.inner.create_external_user(user, synced_at).await?;
        self.wrote();
        Ok(created)
    }

    async fn update_external_user(
        &self,
        id: i64,
        changes: &UserChanges,
        synced_at: DateTime<Utc>,
    ) -> Result<LocalUserRecord> {
        if let Some(current) = self.inner.get_user(id).await? {
            self.check(&current.username)?;
        }
        let updated = self.inner.update_external_user(id, changes, synced_at).await?;
        self.wrote();
        Ok(updated)
    }

    async fn deactivate_user(&self, id: i64, synced_at: DateTime<Utc>) -> Result<()> {
        if let Some(current) = self.inner.get_user(id).await? {
            self.check(&current.username)?;
        }
        self.inner.deactivate_user(id, synced_at).await?;
        self.wrote();
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<Option<LocalUserRecord>> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<LocalUserRecord>> {
        self.inner.get_user_by_external_id(external_id).await
    }

    async fn list_users(&self) -> Result<Vec<LocalUserRecord>> {
        self.inner.list_users().await
    }

    async fn list_external_users(&self) -> Result<Vec<LocalUserRecord>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(DirsyncError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.list_external_users().await
    }
}

#[async_trait]
impl SyncRunRepository for ScriptedRepo {
    async fn create_sync_run(&self, trigger: SyncTrigger) -> Result<SyncRun> {
        let gate = self.run_creation_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.create_sync_run(trigger).await
    }

    async fn mark_sync_run_running(&self, id: &str) -> Result<()> {
        self.inner.mark_sync_run_running(id).await
    }

    async fn finish_sync_run(
        &self,
        id: &str,
        status: SyncRunStatus,
        counters: &SyncCounters,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let failing = self
            .finish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DirsyncError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner
            .finish_sync_run(id, status, counters, error_message)
            .await
    }

    async fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>> {
        self.inner.get_sync_run(id).await
    }

    async fn get_latest_finished_sync_run(&self) -> Result<Option<SyncRun>> {
        self.inner.get_latest_finished_sync_run().await
    }

    async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>> {
        self.inner.list_sync_runs(limit).await
    }

    async fn sync_run_totals(&self) -> Result<SyncRunTotals> {
        self.inner.sync_run_totals().await
    }
}

#[async_trait]
impl SyncLogRepository for ScriptedRepo {
    async fn append_sync_log(&self, entry: &NewSyncLogEntry) -> Result<SyncLogEntry> {
        if *self.failing_log_level.lock().unwrap() == Some(entry.level) {
            return Err(DirsyncError::Database(sqlx::Error::Protocol(
                "log table is locked".into(),
            )));
        }
        self.inner.append_sync_log(entry).await
    }

    async fn query_sync_logs(&self, filter: &LogFilter) -> Result<(Vec<SyncLogEntry>, i64)> {
        self.inner.query_sync_logs(filter).await
    }

    async fn get_sync_log(&self, id: i64) -> Result<Option<SyncLogEntry>> {
        self.inner.get_sync_log(id).await
    }

    async fn delete_sync_logs_before(&self, before: DateTime<Utc>) -> Result<u64> {
        self.inner.delete_sync_logs_before(before).await
    }
}

#[async_trait]
impl DirectoryConfigRepository for ScriptedRepo {
    async fn get_directory_config(&self) -> Result<Option<DirectoryConfig>> {
        self.inner.get_directory_config().await
    }

    async fn save_directory_config(&self, config: &DirectoryConfig) -> Result<()> {
        self.inner.save_directory_config(config).await
    }
}
