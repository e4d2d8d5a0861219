//! Error types for the registry layer.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while authoring schemas and relationships.
///
/// Every failing operation leaves the registry untouched.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The request references something invalid or breaks an invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// The addressed data type, module or field does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A model document could not be built.
    #[error(transparent)]
    Model(#[from] modflow_model::ModelError),

    /// Snapshot serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
