use dirsync_core::db::repository::SyncRunRepository;
use dirsync_core::models::sync::SyncRun;

use super::print_fields;

/// Run the `status` command: show the current sync status.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;

    println!("Dirsync Status");
    println!("==============");
    println!();

    match engine.gate().snapshot() {
        Some(directory) => {
            let interval = directory
                .sync_interval_minutes
                .map(|m| format!("every {m} min"))
                .unwrap_or_else(|| "manual only".into());
            print_fields(&[
                ("Directory", directory.connection.url.clone()),
                ("Base DN", directory.connection.base_dn.clone()),
                ("Enabled", directory.enabled.to_string()),
                ("Schedule", interval),
            ]);
        }
        None => println!("  Directory synchronization is not configured."),
    }
    println!();

    // A run started by another process (e.g. the daemon) only shows up in storage.
    if let Some(latest) = engine.repo.list_sync_runs(1).await?.into_iter().next() {
        if latest.completed_at.is_none() {
            println!(
                "A sync run is in progress: {} ({}, started {})",
                latest.id,
                latest.trigger.as_str(),
                latest.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!();
        }
    }

    let status = engine.coordinator.get_sync_status();
    println!("Last Sync");
    println!("---------");
    if status.sync_id.is_none() {
        println!("  Never synced.");
        return Ok(());
    }
    print_fields(&[
        ("Status", status.status.clone()),
        ("Run", status.sync_id.clone().unwrap_or_default()),
        ("Entries", status.total_users.to_string()),
        ("Synced users", status.synced_users.to_string()),
        ("Errors", status.errors.to_string()),
        ("Warnings", status.warnings.to_string()),
        (
            "Duration",
            status
                .last_sync_duration
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "-".into()),
        ),
        (
            "Finished",
            status
                .last_sync_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".into()),
        ),
    ]);

    Ok(())
}

/// Print the summary of one run.
pub(crate) fn print_run(run: &SyncRun) {
    let c = &run.counters;
    let mut fields = vec![
        ("Run", run.id.clone()),
        ("Trigger", run.trigger.as_str().to_string()),
        ("Status", run.status.as_str().to_string()),
        (
            "Started",
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("Entries", c.total_entries.to_string()),
        ("Created", c.users_created.to_string()),
        ("Updated", c.users_updated.to_string()),
        ("Deactivated", c.users_deactivated.to_string()),
        ("Errors", c.errors.to_string()),
        ("Warnings", c.warnings.to_string()),
    ];
    if let Some(duration) = run.duration() {
        fields.push((
            "Duration",
            format!("{:.1}s", duration.num_milliseconds() as f64 / 1000.0),
        ));
    }
    if let Some(err) = &run.error_message {
        fields.push(("Error", err.clone()));
    }
    print_fields(&fields);
}
