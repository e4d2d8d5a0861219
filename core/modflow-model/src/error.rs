//! Error types for the model layer.

use thiserror::Error;

/// Errors raised while building or interpreting model documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A data type kind outside the fixed catalog.
    #[error("invalid data type kind: {0}")]
    InvalidKind(String),

    /// An identifier failed validation.
    #[error(transparent)]
    Id(#[from] modflow_types::Error),
}

/// Errors raised while resolving `$module-$field` or `item.<name>` references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    /// The reference string does not follow the addressing format.
    #[error("malformed field reference: {0:?}")]
    Invalid(String),

    /// No array field of the module declares the addressed item subfield.
    #[error("no array field declares item subfield {0:?}")]
    NoArrayField(String),

    /// The record holds something other than an array under the array field.
    #[error("field {0:?} does not hold an array")]
    NotAnArray(String),
}

/// Errors raised when a mutation cannot be applied to a field value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// The value has the wrong shape for the operation.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// The arithmetic itself is undefined (division by zero, overflow).
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
}

impl MutationError {
    /// A mismatch between the expected kind and the JSON value found.
    pub fn mismatch(expected: &str, found: &serde_json::Value) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: crate::value::json_type_name(found).to_string(),
        }
    }
}
