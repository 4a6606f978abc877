//! Structured sync log entries tied to a sync run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DirsyncError;

/// Severity of a sync log entry. Unrecognized levels are rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = DirsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(DirsyncError::InvalidLogLevel(other.to_string())),
        }
    }
}

/// A persisted sync log entry. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncLogEntry {
    pub id: i64,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// A log entry about to be appended; id and timestamp are assigned on write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncLogEntry {
    pub run_id: String,
    pub level: LogLevel,
    pub message: String,
    pub username: Option<String>,
    pub details: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub diagnostic: Option<String>,
}

impl NewSyncLogEntry {
    pub fn new(run_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            level,
            message: message.into(),
            username: None,
            details: None,
            error_code: None,
            error_message: None,
            diagnostic: None,
        }
    }

    pub fn info(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(run_id, LogLevel::Info, message)
    }

    pub fn warning(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(run_id, LogLevel::Warning, message)
    }

    pub fn error(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(run_id, LogLevel::Error, message)
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_error(mut self, code: Option<String>, message: impl Into<String>) -> Self {
        self.error_code = code;
        self.error_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

pub const DEFAULT_LOG_LIMIT: i64 = 100;
pub const MAX_LOG_LIMIT: i64 = 1000;

/// Filter for querying sync logs. Every criterion is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogFilter {
    pub limit: Option<i64>,
    pub level: Option<LogLevel>,
    pub run_id: Option<String>,
    pub username: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LogFilter {
    /// The page size, defaulted and clamped to `1..=MAX_LOG_LIMIT`.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .clamp(1, MAX_LOG_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_known_values() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
    }

    #[test]
    fn log_level_rejects_unknown_values() {
        let err = "debug".parse::<LogLevel>().unwrap_err();
        assert!(matches!(err, DirsyncError::InvalidLogLevel(ref l) if l == "debug"));
        assert!("WARN".parse::<LogLevel>().is_err());
        assert!(serde_json::from_str::<LogLevel>("\"fatal\"").is_err());
    }

    #[test]
    fn builder_sets_optional_fields() {
        let entry = NewSyncLogEntry::error("run-1", "failed to create user")
            .with_username("alice")
            .with_error(Some("68".into()), "entry already exists")
            .with_details(serde_json::json!({ "external_id": "u1" }));
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.username.as_deref(), Some("alice"));
        assert_eq!(entry.error_code.as_deref(), Some("68"));
        assert_eq!(entry.details.unwrap()["external_id"], "u1");
        assert!(entry.diagnostic.is_none());
    }

    #[test]
    fn filter_limit_is_clamped() {
        assert_eq!(LogFilter::default().effective_limit(), DEFAULT_LOG_LIMIT);
        let filter = LogFilter {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), MAX_LOG_LIMIT);
        let filter = LogFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), 1);
    }
}
