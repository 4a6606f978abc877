use std::time::Duration;

use dirsync_core::models::status::SyncProgress;
use dirsync_core::models::sync::SyncRunStatus;
use tracing::{info, warn};

use super::status::print_run;

/// Run the `sync` command: start a manual run and follow it to the end.
///
/// The first Ctrl-C cancels the run; the command still waits for it to stop.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;
    let coordinator = engine.coordinator.clone();

    let started = coordinator.start_manual_sync().await?;
    println!(
        "Sync {} started (estimated duration: {})",
        started.run_id, started.estimated_duration
    );

    let wait = coordinator.wait_for_run(&started.run_id);
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut last_line = String::new();
    let mut cancel_requested = false;

    let finished = loop {
        tokio::select! {
            result = &mut wait => break result?,
            _ = ticker.tick() => {
                let line = progress_line(&coordinator.get_sync_progress());
                if !line.is_empty() && line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            signal = tokio::signal::ctrl_c(), if !cancel_requested => {
                signal?;
                cancel_requested = true;
                println!("Cancelling sync, waiting for the current action to finish...");
                if let Err(e) = coordinator.cancel_sync() {
                    warn!("Cancel request ignored: {e}");
                }
            }
        }
    };

    info!(run_id = %finished.id, status = finished.status.as_str(), "Sync finished");
    println!();
    print_run(&finished);

    if finished.status == SyncRunStatus::Failed {
        anyhow::bail!(
            "sync failed: {}",
            finished.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn progress_line(progress: &SyncProgress) -> String {
    if !progress.is_running {
        return String::new();
    }
    let step = progress.current_step.as_deref().unwrap_or("running");
    let mut line = format!("[{:>3}%] {}", progress.progress, step);
    if progress.total_items > 0 {
        line.push_str(&format!(
            " ({}/{})",
            progress.processed_items, progress.total_items
        ));
    }
    if let Some(eta) = &progress.estimated_time {
        line.push_str(&format!(", about {eta} left"));
    }
    line
}
