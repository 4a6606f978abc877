//! Single-flight owner of sync runs and the operator control surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dirsync_core::config::{DirectoryConfig, SyncOptions, REDACTED};
use dirsync_core::db::repository::DirsyncRepository;
use dirsync_core::directory::DirectoryClient;
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::status::{
    humanize_duration, ConnectionTestReport, SyncProgress, SyncStarted, SyncStatistics, SyncStatus,
};
use dirsync_core::models::sync::{SyncRun, SyncTrigger};
use dirsync_core::models::sync_log::{LogFilter, SyncLogEntry};

use crate::config_gate::ConfigGate;
use crate::job::DirectorySyncJob;
use crate::log_sink::SyncLogSink;
use crate::progress::ProgressTracker;

/// Advisory duration returned before any run has finished.
const UNKNOWN_DURATION: &str = "unknown";

/// Handle to the run currently in flight.
struct ActiveRun {
    run_id: String,
    progress: Arc<ProgressTracker>,
}

struct Inner<R: DirsyncRepository> {
    repo: Arc<R>,
    directory: Arc<dyn DirectoryClient>,
    gate: Arc<ConfigGate<R>>,
    sink: SyncLogSink<R>,
    options: SyncOptions,
    /// The single run slot.
    running: AtomicBool,
    /// Set together with the slot, before the run row exists.
    cancel: ArcSwapOption<CancellationToken>,
    active: ArcSwapOption<ActiveRun>,
    last_finished: ArcSwapOption<SyncRun>,
    /// Id of the most recently finished run.
    finished_tx: watch::Sender<Option<String>>,
}

/// Owns the lifecycle of sync runs: at most one runs at a time.
///
/// Cheap to clone; clones share the same run slot. Read operations never wait
/// on the active run.
pub struct SyncCoordinator<R: DirsyncRepository + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: DirsyncRepository + 'static> Clone for SyncCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: DirsyncRepository + 'static> SyncCoordinator<R> {
    pub async fn new(
        repo: Arc<R>,
        directory: Arc<dyn DirectoryClient>,
        gate: Arc<ConfigGate<R>>,
        options: SyncOptions,
    ) -> Result<Self> {
        let last_finished = repo.get_latest_finished_sync_run().await?;
        let (finished_tx, _) = watch::channel(None);
        Ok(Self {
            inner: Arc::new(Inner {
                sink: SyncLogSink::new(Arc::clone(&repo)),
                repo,
                directory,
                gate,
                options,
                running: AtomicBool::new(false),
                cancel: ArcSwapOption::empty(),
                active: ArcSwapOption::empty(),
                last_finished: ArcSwapOption::from(last_finished.map(Arc::new)),
                finished_tx,
            }),
        })
    }

    pub fn gate(&self) -> &Arc<ConfigGate<R>> {
        &self.inner.gate
    }

    pub fn log_sink(&self) -> &SyncLogSink<R> {
        &self.inner.sink
    }

    pub async fn start_manual_sync(&self) -> Result<SyncStarted> {
        self.start(SyncTrigger::Manual).await
    }

    pub async fn start_scheduled_sync(&self) -> Result<SyncStarted> {
        self.start(SyncTrigger::Scheduled).await
    }

    /// Claim the run slot and spawn a run. Returns as soon as the run exists.
    pub async fn start(&self, trigger: SyncTrigger) -> Result<SyncStarted> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DirsyncError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        self.inner.cancel.store(Some(Arc::new(cancel.clone())));

        match self.launch(trigger, cancel).await {
            Ok(started) => Ok(started),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    async fn launch(&self, trigger: SyncTrigger, cancel: CancellationToken) -> Result<SyncStarted> {
        let inner = &self.inner;
        let config = inner.gate.runnable_config()?;
        let run = inner.repo.create_sync_run(trigger).await?;
        let run_id = run.id.clone();

        let progress = Arc::new(ProgressTracker::new(&run.id, run.started_at));
        inner.active.store(Some(Arc::new(ActiveRun {
            run_id: run_id.clone(),
            progress: Arc::clone(&progress),
        })));

        let job = DirectorySyncJob::new(
            Arc::clone(&inner.repo),
            Arc::clone(&inner.directory),
            config,
            run,
            progress,
            cancel,
            inner.options.log_successes,
        );

        let this = self.clone();
        let spawned_id = run_id.clone();
        tokio::spawn(async move {
            let result = job.run().await;
            this.finish(&spawned_id, result).await;
        });

        info!(run_id = %run_id, trigger = trigger.as_str(), "sync run started");
        Ok(SyncStarted {
            run_id,
            estimated_duration: self.estimated_duration(),
        })
    }

    /// Publish the terminal run and release the slot.
    async fn finish(&self, run_id: &str, result: Result<SyncRun>) {
        let inner = &self.inner;
        let finished = match result {
            Ok(run) => Some(run),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "sync run could not be finalized");
                inner.repo.get_latest_finished_sync_run().await.ok().flatten()
            }
        };
        if let Some(run) = finished {
            inner.last_finished.store(Some(Arc::new(run)));
        }
        self.release();
        inner.finished_tx.send_replace(Some(run_id.to_string()));
    }

    fn release(&self) {
        self.inner.active.store(None);
        self.inner.cancel.store(None);
        self.inner.running.store(false, Ordering::Release);
    }

    /// Signal the active run to stop before its next action.
    ///
    /// Accepted from the moment the slot is claimed; a run cancelled before
    /// its row exists ends `Cancelled` without fetching.
    pub fn cancel_sync(&self) -> Result<()> {
        match self.inner.cancel.load().as_ref() {
            Some(cancel) => {
                cancel.cancel();
                info!(run_id = ?self.active_run_id(), "sync cancellation requested");
                Ok(())
            }
            None => Err(DirsyncError::NotRunning),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn active_run_id(&self) -> Option<String> {
        self.inner.active.load().as_ref().map(|a| a.run_id.clone())
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        let last = self.inner.last_finished.load_full();
        match self.inner.active.load().as_ref() {
            Some(active) => {
                let mut status = active.progress.status();
                if let Some(last) = last {
                    status.last_sync_duration = last.duration().map(|d| d.num_seconds());
                    status.last_sync_time = last.completed_at;
                }
                status
            }
            None => last
                .map(|run| SyncStatus::from_finished_run(&run))
                .unwrap_or_else(SyncStatus::never_synced),
        }
    }

    pub fn get_sync_progress(&self) -> SyncProgress {
        self.inner
            .active
            .load()
            .as_ref()
            .map(|active| active.progress.snapshot())
            .unwrap_or_else(SyncProgress::idle)
    }

    pub async fn get_sync_logs(&self, filter: &LogFilter) -> Result<(Vec<SyncLogEntry>, i64)> {
        self.inner.sink.query(filter).await
    }

    pub async fn get_sync_log_details(&self, id: i64) -> Result<SyncLogEntry> {
        self.inner.sink.get_by_id(id).await
    }

    pub async fn get_statistics(&self) -> Result<SyncStatistics> {
        let totals = self.inner.repo.sync_run_totals().await?;
        let recent_runs = self
            .inner
            .repo
            .list_sync_runs(self.inner.options.recent_runs_limit)
            .await?;
        Ok(SyncStatistics {
            totals,
            recent_runs,
        })
    }

    /// Bind against the directory with `candidate`, or the current configuration.
    ///
    /// A redacted password in `candidate` is replaced with the current one.
    pub async fn test_connection(
        &self,
        candidate: Option<DirectoryConfig>,
    ) -> Result<ConnectionTestReport> {
        let config = match candidate {
            Some(mut config) => {
                if config.connection.bind_password == REDACTED {
                    let current = self.inner.gate.snapshot().ok_or_else(|| {
                        DirsyncError::Validation(
                            "connection.bind_password must be provided when no configuration is stored"
                                .into(),
                        )
                    })?;
                    config.connection.bind_password = current.connection.bind_password.clone();
                }
                config.validate()?;
                Arc::new(config)
            }
            None => self.inner.gate.snapshot().ok_or(DirsyncError::NotConfigured)?,
        };

        let started = Instant::now();
        let result = self.inner.directory.test_connection(&config).await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        match result {
            Ok(()) => Ok(ConnectionTestReport {
                url: config.connection.url.clone(),
                message: format!("connected and bound to {}", config.connection.url),
                elapsed_ms,
            }),
            Err(e) => {
                warn!(url = %config.connection.url, error = %e, "directory connection test failed");
                Err(e)
            }
        }
    }

    /// Wait until `run_id` has finished and return its stored record.
    ///
    /// A run that is not in flight here and has no terminal status is
    /// reported as [`DirsyncError::RunNotFinalized`].
    pub async fn wait_for_run(&self, run_id: &str) -> Result<SyncRun> {
        let mut finished_rx = self.inner.finished_tx.subscribe();
        loop {
            // The slot is released only after the terminal write, so check it first.
            let released = self.active_run_id().as_deref() != Some(run_id);
            let run = self
                .inner
                .repo
                .get_sync_run(run_id)
                .await?
                .ok_or_else(|| DirsyncError::NotFound(format!("sync run {run_id}")))?;
            if released {
                if run.status.is_terminal() {
                    return Ok(run);
                }
                return Err(DirsyncError::RunNotFinalized(run_id.to_string()));
            }
            if finished_rx.changed().await.is_err() {
                return Err(DirsyncError::RunNotFinalized(run_id.to_string()));
            }
        }
    }

    /// Advisory duration for a new run, from the last finished run.
    fn estimated_duration(&self) -> String {
        self.inner
            .last_finished
            .load()
            .as_ref()
            .and_then(|run| run.duration())
            .map(humanize_duration)
            .unwrap_or_else(|| UNKNOWN_DURATION.to_string())
    }
}
