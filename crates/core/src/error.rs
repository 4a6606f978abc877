//! Error types for the directory sync core crate.

use thiserror::Error;

/// Top-level error type for all directory sync operations.
#[derive(Debug, Error)]
pub enum DirsyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("directory sync is not configured")]
    NotConfigured,

    #[error("directory sync is disabled")]
    Disabled,

    #[error("invalid directory configuration: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("directory error: {message}")]
    Directory { code: Option<u32>, message: String },

    #[error("a directory sync is already running")]
    AlreadyRunning,

    #[error("no directory sync is running")]
    NotRunning,

    #[error("sync run {0} ended without a recorded outcome")]
    RunNotFinalized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

impl DirsyncError {
    /// Build a directory error without a protocol result code.
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            code: None,
            message: message.into(),
        }
    }

    /// The directory result code carried by this error, if any.
    pub fn directory_code(&self) -> Option<u32> {
        match self {
            Self::Directory { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DirsyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A convenience Result alias that defaults to [`DirsyncError`].
pub type Result<T> = std::result::Result<T, DirsyncError>;
