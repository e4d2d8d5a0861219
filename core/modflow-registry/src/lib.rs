//! Schema registry for modflow.
//!
//! Holds the authoring-side state the rule evaluator reads on every event:
//! - the type catalog (data types and their fixed kinds)
//! - the field registry (fields scoped by module, one label field per module)
//! - the module graph (modules and their outgoing relationships)
//!
//! # Invariants
//!
//! - A field's module and data type exist when the field is created
//! - Only array fields carry an item schema, and item schemas are one level deep
//! - At most one label field per module
//! - `set_relationships` replaces a module's whole list or nothing
//! - Deleting a module removes its fields but not relationships targeting it
//!
//! The graph may contain cycles and self-edges; nothing here assumes otherwise.

mod catalog;
mod error;
mod fields;
mod graph;
mod registry;
mod source;

pub use error::{RegistryError, RegistryResult};
pub use fields::NewField;
pub use registry::{Registry, RegistrySnapshot};
pub use source::SchemaSource;
