//! A single directory sync run: fetch, plan, apply, finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dirsync_core::config::DirectoryConfig;
use dirsync_core::db::repository::DirsyncRepository;
use dirsync_core::directory::DirectoryClient;
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::directory::DirectoryEntry;
use dirsync_core::models::sync::{SyncCounters, SyncRun, SyncRunStatus};
use dirsync_core::models::sync_log::{LogLevel, NewSyncLogEntry};
use dirsync_core::models::user::NewExternalUser;

use crate::log_sink::SyncLogSink;
use crate::planner::{self, PlanNote, SyncAction};
use crate::progress::{ProgressTracker, STEP_FETCHING, STEP_FINALIZING, STEP_PLANNING};

/// Attempts made for a write the run cannot go without.
const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(50);

/// How the run ended, before it is written to storage.
#[derive(Debug)]
struct Outcome {
    status: SyncRunStatus,
    counters: SyncCounters,
    error_message: Option<String>,
}

impl Outcome {
    fn cancelled(counters: SyncCounters) -> Self {
        Self {
            status: SyncRunStatus::Cancelled,
            counters,
            error_message: None,
        }
    }
}

/// State machine for one run.
///
/// The run row is created `Pending` before the job starts. [`run`](Self::run)
/// moves it to `Running`, applies the plan action by action and writes the
/// terminal summary exactly once. A failing action is logged and counted; it
/// never ends the run. Cancellation is checked before each action.
///
/// An error or warning is counted only after its log entry is stored. A log
/// entry that cannot be stored fails the run.
pub struct DirectorySyncJob<R: DirsyncRepository> {
    repo: Arc<R>,
    directory: Arc<dyn DirectoryClient>,
    sink: SyncLogSink<R>,
    config: Arc<DirectoryConfig>,
    run: SyncRun,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
    log_successes: bool,
}

impl<R: DirsyncRepository> DirectorySyncJob<R> {
    pub fn new(
        repo: Arc<R>,
        directory: Arc<dyn DirectoryClient>,
        config: Arc<DirectoryConfig>,
        run: SyncRun,
        progress: Arc<ProgressTracker>,
        cancel: CancellationToken,
        log_successes: bool,
    ) -> Self {
        Self {
            sink: SyncLogSink::new(Arc::clone(&repo)),
            repo,
            directory,
            config,
            run,
            progress,
            cancel,
            log_successes,
        }
    }

    /// Execute the run to a terminal status and return the stored run.
    ///
    /// Fails only when the terminal status cannot be written; the run row is
    /// then left open.
    pub async fn run(self) -> Result<SyncRun> {
        let run_id = self.run.id.clone();
        info!(
            run_id = %run_id,
            trigger = self.run.trigger.as_str(),
            url = %self.config.connection.url,
            "starting directory sync"
        );

        let outcome = self.execute().await;

        self.progress.set_step(STEP_FINALIZING);
        let written = retry_write(&run_id, "sync run summary", || {
            self.repo.finish_sync_run(
                &run_id,
                outcome.status,
                &outcome.counters,
                outcome.error_message.as_deref(),
            )
        })
        .await
        .inspect_err(|e| {
            error!(
                run_id = %run_id,
                status = outcome.status.as_str(),
                error = %e,
                "failed to record sync run outcome"
            )
        })?;
        if !written {
            warn!(run_id = %run_id, "sync run was already finished; summary not overwritten");
        }

        let c = &outcome.counters;
        info!(
            run_id = %run_id,
            status = outcome.status.as_str(),
            total_entries = c.total_entries,
            users_created = c.users_created,
            users_updated = c.users_updated,
            users_deactivated = c.users_deactivated,
            errors = c.errors,
            warnings = c.warnings,
            "directory sync finished"
        );

        self.repo
            .get_sync_run(&run_id)
            .await?
            .ok_or_else(|| DirsyncError::NotFound(format!("sync run {run_id}")))
    }

    async fn execute(&self) -> Outcome {
        let mut counters = SyncCounters::default();

        if let Err(e) = self.repo.mark_sync_run_running(&self.run.id).await {
            return self.fail(counters, "failed to start sync run", e).await;
        }

        if self.cancel.is_cancelled() {
            info!(run_id = %self.run.id, "sync cancelled before the directory was read");
            return Outcome::cancelled(counters);
        }

        self.progress.set_step(STEP_FETCHING);
        let entries = match self.fetch_entries(&mut counters).await {
            Ok(entries) => entries,
            Err(e) => return self.fail(counters, "directory fetch failed", e).await,
        };
        if self.cancel.is_cancelled() {
            info!(run_id = %self.run.id, "sync cancelled before any change was applied");
            return Outcome::cancelled(counters);
        }

        self.progress.set_step(STEP_PLANNING);
        let existing = match self.repo.list_external_users().await {
            Ok(users) => users,
            Err(e) => return self.fail(counters, "failed to load local users", e).await,
        };
        let plan = planner::plan(entries, &existing);
        debug!(
            run_id = %self.run.id,
            actions = plan.actions.len(),
            notes = plan.notes.len(),
            "reconciliation plan computed"
        );
        for note in &plan.notes {
            if let Err(e) = self.record_note(note, &mut counters).await {
                return self.fail(counters, "failed to write sync log", e).await;
            }
        }

        // Entries that are unchanged, duplicated or skipped are done already;
        // each create or update completes one more.
        let writes = plan
            .actions
            .iter()
            .filter(|a| !matches!(a, SyncAction::Deactivate(_)))
            .count() as i64;
        let mut processed = counters.total_entries - writes;
        self.progress
            .start_applying(counters.total_entries, processed, counters);

        let total = plan.actions.len();
        for (i, action) in plan.actions.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(
                    run_id = %self.run.id,
                    applied = i,
                    remaining = total - i,
                    "sync cancelled"
                );
                return Outcome::cancelled(counters);
            }
            if let Err(e) = self.apply(action, &mut counters).await {
                return self.fail(counters, "failed to write sync log", e).await;
            }
            if !matches!(action, SyncAction::Deactivate(_)) {
                processed += 1;
            }
            self.progress.record(processed, counters);
        }

        Outcome {
            status: SyncRunStatus::Completed,
            counters,
            error_message: None,
        }
    }

    /// Read the whole result set. Any error discards what was read so far.
    async fn fetch_entries(&self, counters: &mut SyncCounters) -> Result<Vec<DirectoryEntry>> {
        let mut stream = self.directory.fetch_entries(&self.config);
        let mut entries = Vec::new();
        while let Some(item) = stream.next().await {
            entries.push(item?);
            counters.total_entries = entries.len() as i64;
            self.progress.fetched(*counters);
            if self.cancel.is_cancelled() {
                break;
            }
        }
        Ok(entries)
    }

    /// Store a log entry for this run, retrying transient storage errors.
    async fn log(&self, entry: NewSyncLogEntry) -> Result<()> {
        retry_write(&self.run.id, "sync log entry", || {
            self.sink.append(entry.clone())
        })
        .await
        .map(|_| ())
    }

    async fn record_note(&self, note: &PlanNote, counters: &mut SyncCounters) -> Result<()> {
        warn!(run_id = %self.run.id, level = %note.level, "{}", note.message);

        let mut entry = NewSyncLogEntry::new(&self.run.id, note.level, &note.message);
        if let Some(ref username) = note.username {
            entry = entry.with_username(username);
        }
        if let Some(ref external_id) = note.external_id {
            entry = entry.with_details(serde_json::json!({ "external_id": external_id }));
        }
        self.log(entry).await?;

        match note.level {
            LogLevel::Error => counters.errors += 1,
            LogLevel::Warning => counters.warnings += 1,
            LogLevel::Info => {}
        }
        Ok(())
    }

    /// Apply one action. A failed action is logged and counted; only a log
    /// write failure is returned.
    async fn apply(&self, action: &SyncAction, counters: &mut SyncCounters) -> Result<()> {
        let now = Utc::now();
        let result = match action {
            SyncAction::Create(entry) => self
                .repo
                .create_external_user(
                    &NewExternalUser {
                        external_id: entry.external_id.clone(),
                        username: entry.username().unwrap_or_default().to_string(),
                        email: entry.email.clone(),
                        display_name: entry.display_name.clone(),
                        active: entry.enabled,
                    },
                    now,
                )
                .await
                .map(|_| ()),
            SyncAction::Update { user, changes } => self
                .repo
                .update_external_user(user.id, changes, now)
                .await
                .map(|_| ()),
            SyncAction::Deactivate(user) => self.repo.deactivate_user(user.id, now).await,
        };

        let username = action.username();
        let mut details = serde_json::json!({
            "action": action.kind(),
            "external_id": action.external_id(),
        });
        if let SyncAction::Update { changes, .. } = action {
            details["changes"] = serde_json::to_value(changes).unwrap_or_default();
        }

        match result {
            Ok(()) => {
                let verb = match action {
                    SyncAction::Create(_) => {
                        counters.users_created += 1;
                        "created"
                    }
                    SyncAction::Update { .. } => {
                        counters.users_updated += 1;
                        "updated"
                    }
                    SyncAction::Deactivate(_) => {
                        counters.users_deactivated += 1;
                        "deactivated"
                    }
                };
                debug!(run_id = %self.run.id, username = %username, action = action.kind(), "applied");
                if self.log_successes {
                    self.log(
                        NewSyncLogEntry::info(&self.run.id, format!("{verb} user {username}"))
                            .with_username(username)
                            .with_details(details),
                    )
                    .await?;
                }
            }
            Err(e) => {
                error!(
                    run_id = %self.run.id,
                    username = %username,
                    external_id = %action.external_id(),
                    error = %e,
                    "failed to {} user",
                    action.kind()
                );
                self.log(
                    NewSyncLogEntry::error(
                        &self.run.id,
                        format!("failed to {} user {username}", action.kind()),
                    )
                    .with_username(username)
                    .with_details(details)
                    .with_error(e.directory_code().map(|c| c.to_string()), e.to_string())
                    .with_diagnostic(format!("{e:?}")),
                )
                .await?;
                counters.errors += 1;
            }
        }
        Ok(())
    }

    /// Record a run-level failure: one error entry, one counted error.
    async fn fail(&self, mut counters: SyncCounters, context: &str, e: DirsyncError) -> Outcome {
        let message = format!("{context}: {e}");
        error!(run_id = %self.run.id, error = %e, "{context}");
        let entry = NewSyncLogEntry::error(&self.run.id, format!("directory sync failed: {context}"))
            .with_error(e.directory_code().map(|c| c.to_string()), e.to_string())
            .with_diagnostic(format!("{e:?}"));
        match self.log(entry).await {
            Ok(()) => counters.errors += 1,
            Err(log_err) => error!(
                run_id = %self.run.id,
                error = %log_err,
                "failure entry not stored; it is left out of the error count"
            ),
        }
        Outcome {
            status: SyncRunStatus::Failed,
            counters,
            error_message: Some(message),
        }
    }
}

/// Run `write` up to [`WRITE_ATTEMPTS`] times with a growing pause between
/// attempts, returning the last error.
async fn retry_write<T, F, Fut>(run_id: &str, what: &str, mut write: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < WRITE_ATTEMPTS => {
                warn!(run_id = %run_id, attempt, error = %e, "failed to write {what}, retrying");
                tokio::time::sleep(WRITE_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
