//! Error types for the record service.

use crate::RuleOutcome;
use modflow_model::FieldViolation;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that reject a record write.
///
/// Rule-level problems during propagation never surface here; they are
/// reported as outcomes. The only rule failures that reject a write are
/// `validate` checks run before it.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema lookup or authoring error.
    #[error(transparent)]
    Registry(#[from] modflow_registry::RegistryError),

    /// Record store error.
    #[error(transparent)]
    Storage(#[from] modflow_storage::StorageError),

    /// Record not found in the module.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// The record data does not match the module's fields.
    #[error("record failed validation: {}", join(.0))]
    Validation(Vec<FieldViolation>),

    /// A `validate` rule rejected the write.
    #[error("write rejected by {} validate rule(s)", .0.len())]
    Rejected(Vec<RuleOutcome>),
}

fn join(violations: &[FieldViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
