use dirsync_ldap::scheduler::SyncScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the `daemon` command: scheduled syncs until Ctrl-C.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;
    let coordinator = engine.coordinator.clone();

    let shutdown = CancellationToken::new();
    let scheduler = SyncScheduler::new(coordinator.clone(), engine.config.sync.log_retention_days);
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));

    println!(
        "Dirsync daemon running for {}. Press Ctrl-C to stop.",
        engine.config.dirsync.instance_name
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown.cancel();
    if let Err(e) = handle.await {
        warn!("Scheduler task ended abnormally: {e}");
    }

    if let Some(run_id) = coordinator.active_run_id() {
        info!(run_id = %run_id, "Cancelling active sync before exit");
        if let Err(e) = coordinator.cancel_sync() {
            warn!("Cancel request ignored: {e}");
        }
        match coordinator.wait_for_run(&run_id).await {
            Ok(run) => println!("Sync {} stopped with status {}", run.id, run.status.as_str()),
            Err(e) => warn!(run_id = %run_id, "Sync did not stop cleanly: {e}"),
        }
    }

    println!("Dirsync daemon stopped.");
    Ok(())
}
