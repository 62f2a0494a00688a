//! Error types for vitals-store.

use std::path::PathBuf;

/// Result type for vitals-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vitals-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create the storage directory.
    #[error("Failed to create storage directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to restrict permissions on the secure database.
    #[error("Failed to secure {path}: {source}")]
    SecurePermissions {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
