//! Read-side interface the rule evaluator consumes.

use async_trait::async_trait;
use modflow_model::{DataKind, Field, Relationship};
use modflow_types::{DataTypeId, FieldId, ModuleId};
use std::sync::Arc;

/// Schema lookups needed on every lifecycle event.
///
/// Implementations may suspend (a remote registry, a cache refill), so the
/// methods are async. Missing entities are `None`/empty, never errors: the
/// evaluator degrades dangling references to skipped rules.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Outgoing relationships of a module, in authored order.
    async fn relationships_from(&self, module_id: &ModuleId) -> Arc<[Relationship]>;

    /// Whether the module exists.
    async fn module_exists(&self, module_id: &ModuleId) -> bool;

    /// A field of a module by id.
    async fn get_field(&self, module_id: &ModuleId, field_id: &FieldId) -> Option<Field>;

    /// A field of a module by name.
    async fn get_field_by_name(&self, module_id: &ModuleId, name: &str) -> Option<Field>;

    /// All fields of a module, in creation order.
    async fn list_fields(&self, module_id: &ModuleId) -> Vec<Field>;

    /// Kind of a data type.
    async fn data_kind(&self, data_type_id: &DataTypeId) -> Option<DataKind>;

    /// Number of relationships across the whole graph.
    async fn relationship_count(&self) -> usize;
}
