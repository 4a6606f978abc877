use std::path::Path;

use dirsync_core::config::{DatabaseConfig, DirsyncConfig};
use dirsync_core::db::DatabasePool;
use tracing::info;

/// Run the `init` command: create the data directory, write a default config
/// and set up the database.
pub async fn run(config_path: &str, data_dir: &str) -> anyhow::Result<()> {
    if Path::new(config_path).exists() {
        anyhow::bail!("{config_path} already exists; remove it first to re-initialize");
    }

    let data_path = Path::new(data_dir);
    if !data_path.exists() {
        std::fs::create_dir_all(data_path)?;
        info!("Created data directory: {}", data_dir);
    }

    let config = default_config(data_dir);
    config.validate()?;
    std::fs::write(config_path, toml::to_string_pretty(&config)?)?;
    info!("Wrote configuration to {}", config_path);

    if let Some(path) = config.dirsync.database.path.as_deref() {
        DatabasePool::new_sqlite(&format!("sqlite:{}?mode=rwc", path)).await?;
        info!("Initialized database at {}", path);
    }

    println!("Dirsync initialized.");
    println!("  Config:   {config_path}");
    println!("  Data dir: {data_dir}");
    println!();
    println!("Next: add a [directory] section to the config, or run");
    println!("`dirsync config update --file <directory.toml>`.");
    Ok(())
}

fn default_config(data_dir: &str) -> DirsyncConfig {
    let mut config = DirsyncConfig::generate_default();
    config.dirsync.data_dir = data_dir.to_string();
    config.dirsync.database = DatabaseConfig {
        path: Some(
            Path::new(data_dir)
                .join("dirsync.db")
                .to_string_lossy()
                .to_string(),
        ),
    };
    config
}
