//! Dynamic schema model for modflow.
//!
//! Defines the tenant-authored documents the engine runs on:
//! - [`DataType`] / [`DataKind`]: entries of the type catalog
//! - [`Field`] / [`FieldSchema`]: typed module attributes, with nested item schemas for arrays
//! - [`Module`] / [`Relationship`] / [`EventRule`]: the module graph and its declarative rules
//! - [`ModuleData`]: a record, an arbitrary JSON object owned by a module
//! - [`TargetRef`] / [`SourceRef`]: the wire-stable field addressing scheme
//! - [`Value`]: the schema-checked view over record JSON
//! - [`FieldMutation`]: the arithmetic and assignment primitives rules reduce to
//!
//! Everything here is pure data and pure functions; registries, storage and
//! rule execution live in the crates above this one.

mod data_type;
mod error;
mod module;
mod mutation;
mod record;
mod reference;
mod schema;
mod validate;
mod value;

pub use data_type::{DataKind, DataType};
pub use error::{ModelError, MutationError, RefError};
pub use module::{EventRule, EventRules, Module, Relationship, RuleAction, TargetBinding};
pub use mutation::{FieldMutation, number_to_json};
pub use record::ModuleData;
pub use reference::{
    ItemValue, SourceRef, SourceValue, TargetRef, build_target_ref, parse_target_ref,
    resolve_source_value,
};
pub use schema::{Field, FieldSchema, FieldValidation};
pub use validate::{FieldViolation, TypeResolver, validate_record};
pub use value::{Value, coerce_number};

/// Milliseconds since the Unix epoch, the timestamp unit used by every document.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
