pub mod config;
pub mod daemon;
pub mod init;
pub mod log;
pub mod logs;
pub mod stats;
pub mod status;
pub mod sync;
pub mod test_connection;

use std::path::Path;
use std::sync::Arc;

use dirsync_core::config::{DirectoryConfig, DirsyncConfig};
use dirsync_core::db::sqlite::SqliteRepository;
use dirsync_core::db::DatabasePool;
use dirsync_ldap::client::LdapDirectoryClient;
use dirsync_ldap::config_gate::ConfigGate;
use dirsync_ldap::coordinator::SyncCoordinator;
use tracing::info;

/// Everything a command needs to talk to the engine.
pub struct Engine {
    pub config: DirsyncConfig,
    pub repo: Arc<SqliteRepository>,
    pub coordinator: SyncCoordinator<SqliteRepository>,
}

impl Engine {
    pub fn gate(&self) -> &Arc<ConfigGate<SqliteRepository>> {
        self.coordinator.gate()
    }
}

/// Load the configuration file, open the database and assemble the engine.
pub async fn open(config_path: &str) -> anyhow::Result<Engine> {
    let config = DirsyncConfig::load(Path::new(config_path))?;
    config.validate()?;
    info!("Loaded configuration from {}", config_path);

    let path = config
        .dirsync
        .database
        .path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SQLite path not configured"))?;
    let connect_str = format!("sqlite:{}?mode=rwc", path);
    let repo = match DatabasePool::new_sqlite(&connect_str).await? {
        DatabasePool::Sqlite(p) => Arc::new(SqliteRepository::new(p)),
    };

    let gate = Arc::new(ConfigGate::load(repo.clone(), config.directory.clone()).await?);
    let coordinator = SyncCoordinator::new(
        repo.clone(),
        Arc::new(LdapDirectoryClient::new()),
        gate,
        config.sync.clone(),
    )
    .await?;

    Ok(Engine {
        config,
        repo,
        coordinator,
    })
}

/// Read a standalone directory configuration from a TOML file.
pub fn read_directory_file(path: &str) -> anyhow::Result<DirectoryConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {path}: {e}"))?;
    let config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {path}: {e}"))?;
    Ok(config)
}

/// Print one value per line with aligned labels.
pub(crate) fn print_fields(fields: &[(&str, String)]) {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
    for (label, value) in fields {
        println!("  {:<width$} {}", format!("{label}:"), value, width = width);
    }
}
