//! The directory capability consumed by the sync engine.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::DirectoryConfig;
use crate::error::Result;
use crate::models::directory::DirectoryEntry;

/// Lazy, finite sequence of directory entries. An `Err` item ends the sequence.
pub type EntryStream<'a> = BoxStream<'a, Result<DirectoryEntry>>;

/// Search/bind access to an LDAP-like directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Connect and bind with `config`, then disconnect.
    async fn test_connection(&self, config: &DirectoryConfig) -> Result<()>;

    /// Fetch every entry matching the configured filter. Each call starts a
    /// fresh search.
    fn fetch_entries<'a>(&'a self, config: &'a DirectoryConfig) -> EntryStream<'a>;
}
