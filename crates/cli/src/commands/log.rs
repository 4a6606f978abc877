use super::print_fields;

/// Run the `log` command: show one sync log entry in full.
pub async fn run(config_path: &str, id: i64, json: bool) -> anyhow::Result<()> {
    let engine = super::open(config_path).await?;
    let entry = engine.coordinator.get_sync_log_details(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    let mut fields = vec![
        ("Id", entry.id.to_string()),
        ("Run", entry.run_id.clone()),
        (
            "Time",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        ),
        ("Level", entry.level.to_string()),
        ("Message", entry.message.clone()),
    ];
    let optional = [
        ("User", &entry.username),
        ("Error code", &entry.error_code),
        ("Error", &entry.error_message),
        ("Diagnostic", &entry.diagnostic),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            fields.push((label, value.clone()));
        }
    }
    print_fields(&fields);

    if let Some(details) = &entry.details {
        println!();
        println!("Details:");
        println!("{}", serde_json::to_string_pretty(details)?);
    }
    Ok(())
}
