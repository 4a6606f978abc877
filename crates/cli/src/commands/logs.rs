use chrono::{DateTime, NaiveDate, Utc};
use dirsync_core::models::sync_log::{LogFilter, LogLevel, SyncLogEntry};

/// Filters accepted by the `logs` command, as typed on the command line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LogsArgs {
    pub level: Option<String>,
    pub run: Option<String>,
    pub username: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<i64>,
    pub json: bool,
}

impl LogsArgs {
    /// Convert into a repository filter, rejecting malformed values.
    pub fn to_filter(&self) -> anyhow::Result<LogFilter> {
        let level = self
            .level
            .as_deref()
            .map(str::parse::<LogLevel>)
            .transpose()?;
        Ok(LogFilter {
            limit: self.limit,
            level,
            run_id: self.run.clone(),
            username: self.username.clone(),
            from: self.since.as_deref().map(parse_time).transpose()?,
            to: self.until.as_deref().map(parse_time).transpose()?,
        })
    }
}

/// Run the `logs` command: list sync log entries newest first.
pub async fn run(config_path: &str, args: &LogsArgs) -> anyhow::Result<()> {
    let filter = args.to_filter()?;
    let engine = super::open(config_path).await?;
    let (entries, total) = engine.coordinator.get_sync_logs(&filter).await?;

    if args.json {
        let body = serde_json::json!({ "logs": entries, "total": total });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries match.");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    println!();
    println!("Showing {} of {} entries.", entries.len(), total);
    Ok(())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_time(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        anyhow::anyhow!("invalid time {value:?}: expected RFC 3339 or YYYY-MM-DD")
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date {value:?}"))?;
    Ok(midnight.and_utc())
}

fn format_entry(entry: &SyncLogEntry) -> String {
    let mut line = format!(
        "{:>6}  {}  {:<7}  {}",
        entry.id,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.level.as_str().to_uppercase(),
        entry.message
    );
    if let Some(code) = &entry.error_code {
        line.push_str(&format!(" [{code}]"));
    }
    line
}
