//! Error types for the storage layer.

use modflow_model::MutationError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A record with the same id already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// A field mutation could not be applied to the stored value.
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// Stored data has an unexpected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),
}
