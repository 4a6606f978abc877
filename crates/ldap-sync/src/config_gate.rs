//! The current directory configuration, shared by every run and connection test.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use dirsync_core::config::{DirectoryConfig, REDACTED};
use dirsync_core::db::repository::DirectoryConfigRepository;
use dirsync_core::error::{DirsyncError, Result};

/// Holds the current [`DirectoryConfig`].
///
/// Readers get an immutable snapshot; writers replace the whole value. A run
/// that took a snapshot keeps using it even if the configuration changes
/// underneath it.
pub struct ConfigGate<R: DirectoryConfigRepository> {
    repo: Arc<R>,
    current: ArcSwapOption<DirectoryConfig>,
    write_lock: Mutex<()>,
    reload_tx: watch::Sender<u64>,
}

impl<R: DirectoryConfigRepository> ConfigGate<R> {
    /// Build the gate from storage, falling back to the file configuration.
    pub async fn load(repo: Arc<R>, file_config: Option<DirectoryConfig>) -> Result<Self> {
        let stored = repo.get_directory_config().await?;
        let from_storage = stored.is_some();
        let current = stored.or(file_config);
        if let Some(ref config) = current {
            info!(
                url = %config.connection.url,
                enabled = config.enabled,
                from_storage,
                "directory configuration loaded"
            );
        }
        let (reload_tx, _) = watch::channel(0);
        Ok(Self {
            repo,
            current: ArcSwapOption::from(current.map(Arc::new)),
            write_lock: Mutex::new(()),
            reload_tx,
        })
    }

    /// The current configuration with secrets redacted.
    pub fn get_config(&self) -> Result<DirectoryConfig> {
        self.snapshot()
            .map(|c| c.redacted())
            .ok_or(DirsyncError::NotConfigured)
    }

    /// The current configuration, secrets included. `None` when unconfigured.
    pub fn snapshot(&self) -> Option<Arc<DirectoryConfig>> {
        self.current.load_full()
    }

    /// The configuration a new run should use: configured and enabled.
    pub fn runnable_config(&self) -> Result<Arc<DirectoryConfig>> {
        let config = self.snapshot().ok_or(DirsyncError::NotConfigured)?;
        if !config.enabled {
            return Err(DirsyncError::Disabled);
        }
        Ok(config)
    }

    /// Validate and replace the configuration. Returns the applied value, redacted.
    ///
    /// A password equal to the redaction placeholder keeps the current password.
    pub async fn update_config(&self, mut config: DirectoryConfig) -> Result<DirectoryConfig> {
        let _guard = self.write_lock.lock().await;

        if config.connection.bind_password == REDACTED {
            let current = self.snapshot().ok_or_else(|| {
                DirsyncError::Validation(
                    "connection.bind_password must be provided for a new configuration".into(),
                )
            })?;
            config.connection.bind_password = current.connection.bind_password.clone();
        }
        config.validate()?;

        self.repo.save_directory_config(&config).await?;
        let applied = config.redacted();
        info!(
            url = %config.connection.url,
            base_dn = %config.connection.base_dn,
            enabled = config.enabled,
            "directory configuration updated"
        );
        self.current.store(Some(Arc::new(config)));
        self.notify();
        Ok(applied)
    }

    /// Turn synchronization off. Does nothing if already disabled or unconfigured.
    pub async fn disable(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(current) = self.snapshot() else {
            return Ok(());
        };
        if !current.enabled {
            return Ok(());
        }
        let mut config = (*current).clone();
        config.enabled = false;
        self.repo.save_directory_config(&config).await?;
        self.current.store(Some(Arc::new(config)));
        info!("directory synchronization disabled");
        self.notify();
        Ok(())
    }

    /// Re-read and re-validate the stored configuration before returning.
    pub async fn reload_config(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match self.repo.get_directory_config().await? {
            Some(config) => {
                config.validate()?;
                self.current.store(Some(Arc::new(config)));
                info!("directory configuration reloaded");
            }
            None => match self.snapshot() {
                Some(current) => current.validate()?,
                None => warn!("reload requested but no directory configuration exists"),
            },
        }
        self.notify();
        Ok(())
    }

    /// Receiver that observes a new value after every configuration change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.reload_tx.subscribe()
    }

    fn notify(&self) {
        self.reload_tx.send_modify(|version| *version += 1);
    }
}
