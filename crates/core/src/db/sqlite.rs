use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::DirectoryConfig;
use crate::error::{DirsyncError, Result};
use crate::models::{
    sync::{SyncCounters, SyncRun, SyncRunStatus, SyncRunTotals, SyncTrigger},
    sync_log::{LogFilter, NewSyncLogEntry, SyncLogEntry},
    user::{LocalUserRecord, NewExternalUser, NewLocalUser, UserChanges},
};

use super::repository::{
    DirectoryConfigRepository, DirsyncRepository, LocalUserRepository, SyncLogRepository,
    SyncRunRepository,
};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl DirsyncRepository for SqliteRepository {}

// -- Helper functions for parsing enums from DB strings --

fn parse_run_status(s: &str) -> SyncRunStatus {
    match s {
        "running" => SyncRunStatus::Running,
        "completed" => SyncRunStatus::Completed,
        "failed" => SyncRunStatus::Failed,
        "cancelled" => SyncRunStatus::Cancelled,
        _ => SyncRunStatus::Pending,
    }
}

fn parse_trigger(s: &str) -> SyncTrigger {
    match s {
        "scheduled" => SyncTrigger::Scheduled,
        _ => SyncTrigger::Manual,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Fixed-width UTC timestamps, so string order is chronological order.
fn datetime_to_str(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const USER_COLUMNS: &str =
    "id, external_id, username, email, display_name, active, is_external, last_synced_at";

fn row_to_user(r: &sqlx::sqlite::SqliteRow) -> LocalUserRecord {
    let last_synced: Option<String> = r.get("last_synced_at");
    LocalUserRecord {
        id: r.get("id"),
        external_id: r.get("external_id"),
        username: r.get("username"),
        email: r.get("email"),
        display_name: r.get("display_name"),
        active: r.get::<i32, _>("active") != 0,
        is_external: r.get::<i32, _>("is_external") != 0,
        last_synced_at: last_synced.map(|s| parse_datetime(&s)),
    }
}

fn row_to_sync_run(r: &sqlx::sqlite::SqliteRow) -> SyncRun {
    let completed: Option<String> = r.get("completed_at");
    SyncRun {
        id: r.get("id"),
        trigger: parse_trigger(r.get("trigger_kind")),
        status: parse_run_status(r.get("status")),
        started_at: parse_datetime(r.get("started_at")),
        completed_at: completed.map(|s| parse_datetime(&s)),
        counters: SyncCounters {
            total_entries: r.get("total_entries"),
            users_created: r.get("users_created"),
            users_updated: r.get("users_updated"),
            users_deactivated: r.get("users_deactivated"),
            errors: r.get("errors"),
            warnings: r.get("warnings"),
        },
        error_message: r.get("error_message"),
    }
}

fn row_to_sync_log(r: &sqlx::sqlite::SqliteRow) -> Result<SyncLogEntry> {
    let details: Option<String> = r.get("details");
    let details = details.map(|d| serde_json::from_str(&d)).transpose()?;
    Ok(SyncLogEntry {
        id: r.get("id"),
        run_id: r.get("run_id"),
        timestamp: parse_datetime(r.get("timestamp")),
        level: r.get::<String, _>("level").parse()?,
        message: r.get("message"),
        username: r.get("username"),
        details,
        error_code: r.get("error_code"),
        error_message: r.get("error_message"),
        diagnostic: r.get("diagnostic"),
    })
}

// -- LocalUserRepository --

#[async_trait]
impl LocalUserRepository for SqliteRepository {
    async fn create_local_user(&self, user: &NewLocalUser) -> Result<LocalUserRecord> {
        let now = datetime_to_str(&Utc::now());
        let result = sqlx::query(
            "INSERT INTO users (external_id, username, email, display_name, active, is_external, created_at, updated_at)
             VALUES (NULL, ?1, ?2, ?3, 1, 0, ?4, ?4)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_user(result.last_insert_rowid())
            .await?
            .ok_or_else(|| DirsyncError::NotFound(format!("user {}", result.last_insert_rowid())))
    }

    async fn create_external_user(
        &self,
        user: &NewExternalUser,
        synced_at: DateTime<Utc>,
    ) -> Result<LocalUserRecord> {
        let now = datetime_to_str(&synced_at);
        let result = sqlx::query(
            "INSERT INTO users (external_id, username, email, display_name, active, is_external, last_synced_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6, ?6)",
        )
        .bind(&user.external_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.active as i32)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_user(result.last_insert_rowid())
            .await?
            .ok_or_else(|| DirsyncError::NotFound(format!("user {}", result.last_insert_rowid())))
    }

    async fn update_external_user(
        &self,
        id: i64,
        changes: &UserChanges,
        synced_at: DateTime<Utc>,
    ) -> Result<LocalUserRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DirsyncError::NotFound(format!("user {id}")))?;
        let updated = changes.applied_to(&row_to_user(&row));
        let now = datetime_to_str(&synced_at);

        sqlx::query(
            "UPDATE users SET username = ?2, email = ?3, display_name = ?4, active = ?5, last_synced_at = ?6, updated_at = ?6 WHERE id = ?1",
        )
        .bind(id)
        .bind(&updated.username)
        .bind(&updated.email)
        .bind(&updated.display_name)
        .bind(updated.active as i32)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(LocalUserRecord {
            last_synced_at: Some(parse_datetime(&now)),
            ..updated
        })
    }

    async fn deactivate_user(&self, id: i64, synced_at: DateTime<Utc>) -> Result<()> {
        let now = datetime_to_str(&synced_at);
        let result = sqlx::query(
            "UPDATE users SET active = 0, last_synced_at = ?2, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DirsyncError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<Option<LocalUserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<LocalUserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn list_users(&self) -> Result<Vec<LocalUserRecord>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_user).collect())
    }

    async fn list_external_users(&self) -> Result<Vec<LocalUserRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_external = 1 AND external_id IS NOT NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_user).collect())
    }
}

// -- SyncRunRepository --

#[async_trait]
impl SyncRunRepository for SqliteRepository {
    async fn create_sync_run(&self, trigger: SyncTrigger) -> Result<SyncRun> {
        let id = uuid::Uuid::new_v4().to_string();
        let now_str = datetime_to_str(&Utc::now());

        sqlx::query(
            "INSERT INTO sync_runs (id, trigger_kind, status, started_at) VALUES (?1, ?2, 'pending', ?3)",
        )
        .bind(&id)
        .bind(trigger.as_str())
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        Ok(SyncRun {
            id,
            trigger,
            status: SyncRunStatus::Pending,
            started_at: parse_datetime(&now_str),
            completed_at: None,
            counters: SyncCounters::default(),
            error_message: None,
        })
    }

    async fn mark_sync_run_running(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sync_runs SET status = 'running' WHERE id = ?1 AND completed_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_sync_run(
        &self,
        id: &str,
        status: SyncRunStatus,
        counters: &SyncCounters,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let now_str = datetime_to_str(&Utc::now());
        let result = sqlx::query(
            "UPDATE sync_runs SET status = ?2, completed_at = ?3, total_entries = ?4, users_created = ?5, users_updated = ?6, users_deactivated = ?7, errors = ?8, warnings = ?9, error_message = ?10
             WHERE id = ?1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&now_str)
        .bind(counters.total_entries)
        .bind(counters.users_created)
        .bind(counters.users_updated)
        .bind(counters.users_deactivated)
        .bind(counters.errors)
        .bind(counters.warnings)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>> {
        let row = sqlx::query("SELECT * FROM sync_runs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_sync_run))
    }

    async fn get_latest_finished_sync_run(&self) -> Result<Option<SyncRun>> {
        let row = sqlx::query(
            "SELECT * FROM sync_runs WHERE completed_at IS NOT NULL ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_sync_run))
    }

    async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query("SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_sync_run).collect())
    }

    async fn sync_run_totals(&self) -> Result<SyncRunTotals> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total_runs,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_runs,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed_runs,
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0) AS cancelled_runs,
                COALESCE(SUM(users_created), 0) AS users_created,
                COALESCE(SUM(users_updated), 0) AS users_updated,
                COALESCE(SUM(users_deactivated), 0) AS users_deactivated,
                COALESCE(SUM(errors), 0) AS errors,
                COALESCE(SUM(warnings), 0) AS warnings
             FROM sync_runs WHERE completed_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncRunTotals {
            total_runs: row.get("total_runs"),
            completed_runs: row.get("completed_runs"),
            failed_runs: row.get("failed_runs"),
            cancelled_runs: row.get("cancelled_runs"),
            users_created: row.get("users_created"),
            users_updated: row.get("users_updated"),
            users_deactivated: row.get("users_deactivated"),
            errors: row.get("errors"),
            warnings: row.get("warnings"),
        })
    }
}

// -- SyncLogRepository --

/// WHERE clause and string binds for a log filter.
fn log_filter_clause(filter: &LogFilter) -> (String, Vec<String>) {
    let mut sql = String::from(" WHERE 1=1");
    let mut binds = Vec::new();

    if let Some(level) = filter.level {
        sql.push_str(" AND level = ?");
        binds.push(level.as_str().to_string());
    }
    if let Some(ref run_id) = filter.run_id {
        sql.push_str(" AND run_id = ?");
        binds.push(run_id.clone());
    }
    if let Some(ref username) = filter.username {
        sql.push_str(" AND username = ?");
        binds.push(username.clone());
    }
    if let Some(ref from) = filter.from {
        sql.push_str(" AND timestamp >= ?");
        binds.push(datetime_to_str(from));
    }
    if let Some(ref to) = filter.to {
        sql.push_str(" AND timestamp <= ?");
        binds.push(datetime_to_str(to));
    }
    (sql, binds)
}

#[async_trait]
impl SyncLogRepository for SqliteRepository {
    async fn append_sync_log(&self, entry: &NewSyncLogEntry) -> Result<SyncLogEntry> {
        let now = datetime_to_str(&Utc::now());
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "INSERT INTO sync_logs (run_id, timestamp, level, message, username, details, error_code, error_message, diagnostic)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&entry.run_id)
        .bind(&now)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.username)
        .bind(&details)
        .bind(&entry.error_code)
        .bind(&entry.error_message)
        .bind(&entry.diagnostic)
        .execute(&self.pool)
        .await?;

        Ok(SyncLogEntry {
            id: result.last_insert_rowid(),
            run_id: entry.run_id.clone(),
            timestamp: parse_datetime(&now),
            level: entry.level,
            message: entry.message.clone(),
            username: entry.username.clone(),
            details: entry.details.clone(),
            error_code: entry.error_code.clone(),
            error_message: entry.error_message.clone(),
            diagnostic: entry.diagnostic.clone(),
        })
    }

    async fn query_sync_logs(&self, filter: &LogFilter) -> Result<(Vec<SyncLogEntry>, i64)> {
        let (clause, binds) = log_filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM sync_logs{clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &binds {
            count_query = count_query.bind(b);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!("SELECT * FROM sync_logs{clause} ORDER BY id DESC LIMIT ?");
        let mut query = sqlx::query(&select_sql);
        for b in &binds {
            query = query.bind(b);
        }
        let rows = query
            .bind(filter.effective_limit())
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .iter()
            .map(row_to_sync_log)
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, total))
    }

    async fn get_sync_log(&self, id: i64) -> Result<Option<SyncLogEntry>> {
        let row = sqlx::query("SELECT * FROM sync_logs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_sync_log).transpose()
    }

    async fn delete_sync_logs_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_logs WHERE timestamp < ?1")
            .bind(datetime_to_str(&before))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// -- DirectoryConfigRepository --

#[async_trait]
impl DirectoryConfigRepository for SqliteRepository {
    async fn get_directory_config(&self) -> Result<Option<DirectoryConfig>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT config FROM directory_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(json,)| serde_json::from_str(&json).map_err(DirsyncError::from))
            .transpose()
    }

    async fn save_directory_config(&self, config: &DirectoryConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        sqlx::query(
            "INSERT INTO directory_config (id, config, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET config = excluded.config, updated_at = excluded.updated_at",
        )
        .bind(&json)
        .bind(datetime_to_str(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
