//! The schema registry: type catalog, field registry and module graph behind
//! one lock, so cross-component invariants (a field's module and data type
//! exist, relationship targets exist) are checked and applied atomically.

use crate::catalog::TypeCatalog;
use crate::fields::{FieldRegistry, NewField};
use crate::graph::ModuleGraph;
use crate::source::SchemaSource;
use crate::{RegistryError, RegistryResult};
use async_trait::async_trait;
use modflow_model::{
    DataKind, DataType, Field, Module, Relationship, TypeResolver, now_millis,
};
use modflow_types::{DataTypeId, FieldId, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Serializable copy of the whole registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub data_types: Vec<DataType>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Default)]
struct State {
    catalog: TypeCatalog,
    fields: FieldRegistry,
    graph: ModuleGraph,
}

/// In-memory schema registry.
///
/// Reads take a shared lock and return clones; writes are rare. The
/// generation counter increases on every successful write so callers that
/// cache lookups know when to drop them.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<State>,
    generation: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a snapshot.
    ///
    /// Fields must belong to a module in the snapshot. Relationship targets
    /// are not checked: a persisted graph may legitimately point at a module
    /// deleted since.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> RegistryResult<Self> {
        let mut state = State::default();
        for data_type in snapshot.data_types {
            state.catalog.insert(data_type)?;
        }
        for module in snapshot.modules {
            state.graph.insert(module)?;
        }
        let mut seen = std::collections::HashSet::new();
        for field in snapshot.fields {
            if !state.graph.contains(&field.module_id) {
                return Err(RegistryError::Validation(format!(
                    "field {} belongs to unknown module {}",
                    field.id, field.module_id
                )));
            }
            if !seen.insert(field.id.clone()) {
                return Err(RegistryError::Validation(format!("duplicate field id {}", field.id)));
            }
            state.fields.insert(field);
        }
        info!(
            "Loaded registry snapshot: {} modules, {} relationships",
            state.graph.list().len(),
            state.graph.relationship_count()
        );
        Ok(Self {
            state: RwLock::new(state),
            generation: AtomicU64::new(0),
        })
    }

    /// Parses a JSON snapshot.
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    /// Copies the whole registry out.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read().await;
        let modules = state.graph.list();
        let fields = modules
            .iter()
            .flat_map(|m| state.fields.list(&m.id).iter().cloned())
            .collect();
        RegistrySnapshot {
            data_types: state.catalog.list(),
            modules,
            fields,
        }
    }

    /// Write generation; changes whenever the registry changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // ── Type catalog ─────────────────────────────────────────────

    /// Creates a data type. `kind` must name one of the catalog kinds.
    pub async fn create_data_type(&self, name: &str, kind: &str) -> RegistryResult<DataType> {
        let data_type = self.state.write().await.catalog.create(name, kind)?;
        self.bump();
        info!("Created data type {} ({}, {})", data_type.id, data_type.name, data_type.kind);
        Ok(data_type)
    }

    /// Looks up a data type.
    pub async fn resolve_data_type(&self, id: &DataTypeId) -> RegistryResult<DataType> {
        self.state.read().await.catalog.resolve(id).cloned()
    }

    /// All data types, oldest first.
    pub async fn list_data_types(&self) -> Vec<DataType> {
        self.state.read().await.catalog.list()
    }

    /// Renames a data type. The kind never changes.
    pub async fn rename_data_type(&self, id: &DataTypeId, name: &str) -> RegistryResult<DataType> {
        let name = crate::catalog::clean_name("data type", name)?;
        let mut state = self.state.write().await;
        let data_type = state.catalog.get_mut(id)?;
        data_type.name = name;
        data_type.updated_at = now_millis();
        let data_type = data_type.clone();
        drop(state);
        self.bump();
        Ok(data_type)
    }

    /// Activates or retires a data type. Inactive types cannot type new fields.
    pub async fn set_data_type_active(&self, id: &DataTypeId, active: bool) -> RegistryResult<DataType> {
        let mut state = self.state.write().await;
        let data_type = state.catalog.get_mut(id)?;
        data_type.is_active = active;
        data_type.updated_at = now_millis();
        let data_type = data_type.clone();
        drop(state);
        self.bump();
        Ok(data_type)
    }

    /// Deletes a data type and every field typed by it.
    pub async fn delete_data_type(&self, id: &DataTypeId) -> RegistryResult<Vec<Field>> {
        let mut state = self.state.write().await;
        state.catalog.remove(id)?;
        let removed = state.fields.delete_typed_by(id);
        drop(state);
        self.bump();
        if !removed.is_empty() {
            warn!("Deleting data type {} removed {} fields", id, removed.len());
        }
        Ok(removed)
    }

    // ── Modules ──────────────────────────────────────────────────

    /// Creates a module with no relationships.
    pub async fn create_module(&self, name: &str) -> RegistryResult<Module> {
        self.insert_module(None, name).await
    }

    /// Creates a module under a caller-chosen id.
    pub async fn create_module_with_id(&self, id: ModuleId, name: &str) -> RegistryResult<Module> {
        self.insert_module(Some(id), name).await
    }

    async fn insert_module(&self, id: Option<ModuleId>, name: &str) -> RegistryResult<Module> {
        let module = self.state.write().await.graph.create(id, name)?;
        self.bump();
        info!("Created module {} ({})", module.id, module.name);
        Ok(module)
    }

    /// Looks up a module.
    pub async fn get_module(&self, id: &ModuleId) -> RegistryResult<Module> {
        self.state.read().await.graph.get(id).cloned()
    }

    /// All live modules, in creation order.
    pub async fn list_modules(&self) -> Vec<Module> {
        self.state.read().await.graph.list()
    }

    /// Renames a module.
    pub async fn rename_module(&self, id: &ModuleId, name: &str) -> RegistryResult<Module> {
        let module = self.state.write().await.graph.rename(id, name)?;
        self.bump();
        Ok(module)
    }

    /// Replaces a module's relationship list in one write.
    ///
    /// Every target must exist and every base must be `id`; otherwise
    /// nothing changes.
    pub async fn set_relationships(
        &self,
        id: &ModuleId,
        relationships: Vec<Relationship>,
    ) -> RegistryResult<Module> {
        let module = self.state.write().await.graph.set_relationships(id, relationships)?;
        self.bump();
        debug!("Module {} now has {} relationships", id, module.relationships.len());
        Ok(module)
    }

    /// Deletes a module and its fields.
    ///
    /// Relationships in other modules that target it are left in place.
    pub async fn delete_module(&self, id: &ModuleId) -> RegistryResult<Module> {
        let mut state = self.state.write().await;
        let module = state.graph.remove(id)?;
        let removed = state.fields.delete_of(id);
        let dangling = state.graph.referencing(id);
        drop(state);
        self.bump();
        info!("Deleted module {} and {} fields", id, removed.len());
        if !dangling.is_empty() {
            warn!("Modules {:?} still have relationships targeting deleted module {}", dangling, id);
        }
        Ok(module)
    }

    /// Outgoing relationships of a module.
    pub async fn relationships_from(&self, id: &ModuleId) -> Arc<[Relationship]> {
        self.state.read().await.graph.relationships_from(id)
    }

    // ── Fields ───────────────────────────────────────────────────

    /// Creates a field.
    ///
    /// Creating a label field unsets the module's previous label field.
    pub async fn create_field(&self, input: NewField) -> RegistryResult<Field> {
        let mut state = self.state.write().await;
        if !state.graph.contains(&input.module_id) {
            return Err(RegistryError::Validation(format!("module {} does not exist", input.module_id)));
        }
        let field = state.fields.build(input, &state.catalog)?;
        state.fields.insert(field.clone());
        drop(state);
        self.bump();
        debug!("Created field {} ({}) on module {}", field.id, field.name, field.module_id);
        Ok(field)
    }

    /// Fields of a module, in creation order.
    pub async fn list_fields(&self, module_id: &ModuleId) -> Vec<Field> {
        self.state.read().await.fields.list(module_id).to_vec()
    }

    /// A field by id.
    pub async fn get_field(&self, module_id: &ModuleId, field_id: &FieldId) -> Option<Field> {
        self.state.read().await.fields.get(module_id, field_id).cloned()
    }

    /// A field by name.
    pub async fn get_field_by_name(&self, module_id: &ModuleId, name: &str) -> Option<Field> {
        self.state.read().await.fields.by_name(module_id, name).cloned()
    }

    /// The module's label field, if any.
    pub async fn label_field(&self, module_id: &ModuleId) -> Option<Field> {
        self.state.read().await.fields.label(module_id).cloned()
    }

    /// Makes `field_id` the module's only label field.
    pub async fn set_label(&self, module_id: &ModuleId, field_id: &FieldId) -> RegistryResult<Field> {
        let field = self.state.write().await.fields.set_label(module_id, field_id)?;
        self.bump();
        Ok(field)
    }

    /// Deletes every field of a module.
    pub async fn delete_fields_of(&self, module_id: &ModuleId) -> Vec<Field> {
        let removed = self.state.write().await.fields.delete_of(module_id);
        self.bump();
        removed
    }

    /// Kinds of the data types referenced by `fields` and their item schemas.
    pub async fn kinds_for(&self, fields: &[Field]) -> HashMap<DataTypeId, DataKind> {
        let state = self.state.read().await;
        fields
            .iter()
            .flat_map(|f| {
                std::iter::once(&f.data_type_id)
                    .chain(f.type_schema.iter().flatten().map(|s| &s.data_type_id))
            })
            .filter_map(|id| state.catalog.kind_of(id).map(|k| (id.clone(), k)))
            .collect()
    }
}

#[async_trait]
impl SchemaSource for Registry {
    async fn relationships_from(&self, module_id: &ModuleId) -> Arc<[Relationship]> {
        Registry::relationships_from(self, module_id).await
    }

    async fn module_exists(&self, module_id: &ModuleId) -> bool {
        self.state.read().await.graph.contains(module_id)
    }

    async fn get_field(&self, module_id: &ModuleId, field_id: &FieldId) -> Option<Field> {
        Registry::get_field(self, module_id, field_id).await
    }

    async fn get_field_by_name(&self, module_id: &ModuleId, name: &str) -> Option<Field> {
        Registry::get_field_by_name(self, module_id, name).await
    }

    async fn list_fields(&self, module_id: &ModuleId) -> Vec<Field> {
        Registry::list_fields(self, module_id).await
    }

    async fn data_kind(&self, data_type_id: &DataTypeId) -> Option<DataKind> {
        self.state.read().await.catalog.kind_of(data_type_id)
    }

    async fn relationship_count(&self) -> usize {
        self.state.read().await.graph.relationship_count()
    }
}
