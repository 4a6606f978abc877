//! TOML-based configuration system for dirsync.

use crate::error::{DirsyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level dirsync configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirsyncConfig {
    pub dirsync: DirsyncSection,
    /// Initial directory configuration. A configuration saved at runtime
    /// takes precedence over this section.
    #[serde(default)]
    pub directory: Option<DirectoryConfig>,
    #[serde(default)]
    pub sync: SyncOptions,
}

/// Core instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirsyncSection {
    pub instance_name: String,
    pub data_dir: String,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// SQLite database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some("/var/lib/dirsync/dirsync.db".into()),
        }
    }
}

/// Engine behaviour that is not part of the directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Write one info-level log entry per applied action.
    #[serde(default = "default_true")]
    pub log_successes: bool,
    /// Number of recent runs included in statistics.
    #[serde(default = "default_recent_runs_limit")]
    pub recent_runs_limit: i64,
    /// Sync log entries older than this are purged by the scheduler. 0 keeps everything.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            log_successes: true,
            recent_runs_limit: default_recent_runs_limit(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_recent_runs_limit() -> i64 {
    10
}

fn default_log_retention_days() -> u32 {
    90
}

/// The directory configuration consulted by every sync run and connection test.
///
/// Replaced wholesale on update; never patched field by field.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Interval for scheduled runs. `None` disables the schedule.
    #[serde(default)]
    pub sync_interval_minutes: Option<u64>,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub attributes: AttributeMapping,
}

/// Connection parameters for the LDAP directory.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// `ldap://host[:port]` or `ldaps://host[:port]`.
    pub url: String,
    /// Empty for an anonymous bind.
    #[serde(default)]
    pub bind_dn: String,
    #[serde(default)]
    pub bind_password: String,
    pub base_dn: String,
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    #[serde(default)]
    pub starttls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

fn default_user_filter() -> String {
    "(objectClass=person)".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> i32 {
    500
}

/// Maps directory attributes onto local user fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeMapping {
    pub external_id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Boolean attribute or an Active Directory `userAccountControl` bitmask.
    #[serde(default)]
    pub enabled: Option<String>,
}

impl Default for AttributeMapping {
    fn default() -> Self {
        Self {
            external_id: "entryUUID".into(),
            username: "uid".into(),
            email: "mail".into(),
            display_name: Some("cn".into()),
            enabled: None,
        }
    }
}

impl AttributeMapping {
    /// Every directory attribute the search must request.
    pub fn requested_attributes(&self) -> Vec<String> {
        let mut attrs = vec![
            self.external_id.clone(),
            self.username.clone(),
            self.email.clone(),
        ];
        attrs.extend(self.display_name.iter().cloned());
        attrs.extend(self.enabled.iter().cloned());
        let mut seen = std::collections::HashSet::new();
        attrs.retain(|a| !a.eq_ignore_ascii_case("dn") && seen.insert(a.to_ascii_lowercase()));
        attrs
    }
}

/// Placeholder that replaces secrets in operator-facing output.
pub const REDACTED: &str = "********";

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("enabled", &self.enabled)
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("connection", &self.connection)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &(!self.bind_password.is_empty()).then_some(REDACTED),
            )
            .field("base_dn", &self.base_dn)
            .field("user_filter", &self.user_filter)
            .field("tls_verify", &self.tls_verify)
            .field("starttls", &self.starttls)
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl DirectoryConfig {
    /// Copy of this configuration safe to hand to operators.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.connection.bind_password.is_empty() {
            copy.connection.bind_password = REDACTED.into();
        }
        copy
    }

    /// Validate the required fields of the configuration.
    pub fn validate(&self) -> Result<()> {
        let url = self.connection.url.trim();
        let host = url
            .strip_prefix("ldap://")
            .or_else(|| url.strip_prefix("ldaps://"))
            .ok_or_else(|| {
                DirsyncError::Validation(format!(
                    "connection.url must start with ldap:// or ldaps://, got {url:?}"
                ))
            })?;
        let host = host.split('/').next().unwrap_or_default();
        if host.is_empty() || host.starts_with(':') {
            return Err(DirsyncError::Validation(
                "connection.url must include a host".into(),
            ));
        }
        if let Some((_, port)) = host.rsplit_once(':') {
            if port.parse::<u16>().is_err() {
                return Err(DirsyncError::Validation(format!(
                    "connection.url has an invalid port: {port:?}"
                )));
            }
        }

        if self.connection.base_dn.trim().is_empty() {
            return Err(DirsyncError::Validation(
                "connection.base_dn must not be empty".into(),
            ));
        }
        if !self.connection.bind_dn.is_empty() && self.connection.bind_password.is_empty() {
            return Err(DirsyncError::Validation(
                "connection.bind_password is required when bind_dn is set".into(),
            ));
        }
        if self.connection.page_size <= 0 {
            return Err(DirsyncError::Validation(
                "connection.page_size must be positive".into(),
            ));
        }

        let required = [
            ("attributes.external_id", &self.attributes.external_id),
            ("attributes.username", &self.attributes.username),
            ("attributes.email", &self.attributes.email),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(DirsyncError::Validation(format!("{name} must be mapped")));
            }
        }

        if self.sync_interval_minutes == Some(0) {
            return Err(DirsyncError::Validation(
                "sync_interval_minutes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

impl DirsyncConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DirsyncError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate the configuration, returning an error for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        if self.dirsync.instance_name.is_empty() {
            return Err(DirsyncError::Config(
                "dirsync.instance_name must not be empty".into(),
            ));
        }

        if self.dirsync.data_dir.is_empty() {
            return Err(DirsyncError::Config(
                "dirsync.data_dir must not be empty".into(),
            ));
        }

        if self.dirsync.database.path.is_none() {
            return Err(DirsyncError::Config(
                "dirsync.database.path is required".into(),
            ));
        }

        if self.sync.recent_runs_limit <= 0 {
            return Err(DirsyncError::Config(
                "sync.recent_runs_limit must be positive".into(),
            ));
        }

        if let Some(ref directory) = self.directory {
            directory
                .validate()
                .map_err(|e| DirsyncError::Config(format!("[directory] {e}")))?;
        }

        Ok(())
    }

    /// Generate a sensible default configuration.
    pub fn generate_default() -> Self {
        Self {
            dirsync: DirsyncSection {
                instance_name: "dirsync".into(),
                data_dir: "/var/lib/dirsync".into(),
                database: DatabaseConfig::default(),
            },
            directory: None,
            sync: SyncOptions::default(),
        }
    }
}
