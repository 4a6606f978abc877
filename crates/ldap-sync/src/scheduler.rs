//! Periodic trigger for scheduled sync runs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dirsync_core::config::DirectoryConfig;
use dirsync_core::db::repository::DirsyncRepository;
use dirsync_core::error::DirsyncError;

use crate::coordinator::SyncCoordinator;

/// Interval between scheduled runs, if the schedule is active.
pub fn schedule_period(config: Option<&DirectoryConfig>) -> Option<Duration> {
    let config = config.filter(|c| c.enabled)?;
    let minutes = config.sync_interval_minutes.filter(|m| *m > 0)?;
    Some(Duration::from_secs(minutes.saturating_mul(60)))
}

/// Starts scheduled runs at the configured interval and purges old sync logs.
///
/// The timer restarts whenever the configuration changes. A tick that finds a
/// run already in progress is skipped.
pub struct SyncScheduler<R: DirsyncRepository + 'static> {
    coordinator: SyncCoordinator<R>,
    log_retention_days: u32,
}

impl<R: DirsyncRepository + 'static> SyncScheduler<R> {
    pub fn new(coordinator: SyncCoordinator<R>, log_retention_days: u32) -> Self {
        Self {
            coordinator,
            log_retention_days,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let gate = Arc::clone(self.coordinator.gate());
        let mut reload = gate.subscribe();
        info!("sync scheduler started");

        loop {
            let period = schedule_period(gate.snapshot().as_deref());
            match period {
                Some(p) => debug!(period_secs = p.as_secs(), "next scheduled sync armed"),
                None => debug!("scheduled sync inactive"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = reload.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("directory configuration changed, rescheduling");
                }
                _ = sleep_for(period) => self.tick().await,
            }
        }

        info!("sync scheduler stopped");
    }

    /// One scheduled firing: purge expired logs, then try to start a run.
    pub async fn tick(&self) {
        if let Err(e) = self
            .coordinator
            .log_sink()
            .purge_older_than(self.log_retention_days)
            .await
        {
            warn!(error = %e, "failed to purge old sync logs");
        }

        match self.coordinator.start_scheduled_sync().await {
            Ok(started) => info!(run_id = %started.run_id, "scheduled sync started"),
            Err(DirsyncError::AlreadyRunning) => {
                debug!("scheduled sync skipped: a run is already in progress")
            }
            Err(e @ (DirsyncError::Disabled | DirsyncError::NotConfigured)) => {
                debug!(reason = %e, "scheduled sync skipped")
            }
            Err(e) => warn!(error = %e, "scheduled sync could not start"),
        }
    }
}

async fn sleep_for(period: Option<Duration>) {
    match period {
        Some(p) => tokio::time::sleep(p).await,
        None => std::future::pending().await,
    }
}
