//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint or config
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::migrate::MigrateError> for CheckpointError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CheckpointError::Storage(format!("Migration failed: {}", err))
    }
}
