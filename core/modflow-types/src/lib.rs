//! Core type definitions for modflow.
//!
//! This crate defines the fundamental, tenant-agnostic types used throughout
//! the engine:
//! - Data type, module, field and record identifiers
//! - Record lifecycle event types (create, update, delete)
//!
//! Module schemas, relationships and record payloads live in
//! `modflow-model`; nothing here knows what a record contains.

mod event;
mod ids;

pub use event::EventType;
pub use ids::{DataTypeId, FieldId, ModuleId, RecordId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid identifier {0:?}: must be non-empty and must not contain '$' or whitespace")]
    InvalidId(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}
