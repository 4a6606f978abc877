use dirsync_core::models::status::SyncStatistics;

use super::print_fields;

/// Run the `stats` command: totals across finished runs plus the recent runs.
pub async fn run(config_path: &str, json: bool) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;
    let stats = engine.coordinator.get_statistics().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    print_statistics(&stats);
    Ok(())
}

fn print_statistics(stats: &SyncStatistics) {
    let t = &stats.totals;
    println!("Sync Statistics");
    println!("===============");
    print_fields(&[
        ("Runs", t.total_runs.to_string()),
        ("Completed", t.completed_runs.to_string()),
        ("Failed", t.failed_runs.to_string()),
        ("Cancelled", t.cancelled_runs.to_string()),
        ("Users created", t.users_created.to_string()),
        ("Users updated", t.users_updated.to_string()),
        ("Users deactivated", t.users_deactivated.to_string()),
        ("Errors", t.errors.to_string()),
        ("Warnings", t.warnings.to_string()),
    ]);
    println!();

    if stats.recent_runs.is_empty() {
        println!("No sync runs recorded.");
        return;
    }

    println!("Recent Runs");
    println!("-----------");
    println!(
        "{:<36}  {:<9}  {:<9}  {:<19}  {:>7}  {:>7}  {:>7}  {:>6}",
        "RUN", "TRIGGER", "STATUS", "STARTED", "CREATED", "UPDATED", "DEACT", "ERRORS"
    );
    for run in &stats.recent_runs {
        let c = &run.counters;
        println!(
            "{:<36}  {:<9}  {:<9}  {:<19}  {:>7}  {:>7}  {:>7}  {:>6}",
            run.id,
            run.trigger.as_str(),
            run.status.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            c.users_created,
            c.users_updated,
            c.users_deactivated,
            c.errors
        );
    }
}
