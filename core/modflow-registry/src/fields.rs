//! Field registry: fields scoped by module, in creation order.

use crate::catalog::{TypeCatalog, clean_name};
use crate::{RegistryError, RegistryResult};
use modflow_model::{DataKind, Field, FieldSchema};
use modflow_types::{DataTypeId, FieldId, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Input for creating a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewField {
    /// Explicit id; a fresh one is generated when absent.
    #[serde(default)]
    pub id: Option<FieldId>,
    pub module_id: ModuleId,
    pub name: String,
    #[serde(alias = "type")]
    pub data_type_id: DataTypeId,
    #[serde(default)]
    pub is_label: bool,
    #[serde(default)]
    pub type_schema: Option<Vec<FieldSchema>>,
}

impl NewField {
    pub fn new(module_id: ModuleId, name: impl Into<String>, data_type_id: DataTypeId) -> Self {
        Self {
            id: None,
            module_id,
            name: name.into(),
            data_type_id,
            is_label: false,
            type_schema: None,
        }
    }

    /// Uses a caller-chosen id.
    #[must_use]
    pub fn with_id(mut self, id: FieldId) -> Self {
        self.id = Some(id);
        self
    }

    /// Makes this the module's label field.
    #[must_use]
    pub fn label(mut self) -> Self {
        self.is_label = true;
        self
    }

    /// Sets the array item schema.
    #[must_use]
    pub fn with_type_schema(mut self, schema: Vec<FieldSchema>) -> Self {
        self.type_schema = Some(schema);
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct FieldRegistry {
    by_module: HashMap<ModuleId, Vec<Field>>,
    owner: HashMap<FieldId, ModuleId>,
}

impl FieldRegistry {
    /// Checks a new field against the catalog. The caller has checked the module.
    pub(crate) fn build(&self, input: NewField, catalog: &TypeCatalog) -> RegistryResult<Field> {
        let name = clean_name("field", &input.name)?;
        let id = input.id.unwrap_or_default();
        if self.owner.contains_key(&id) {
            return Err(RegistryError::Validation(format!("duplicate field id {id}")));
        }
        if self.by_name(&input.module_id, &name).is_some() {
            return Err(RegistryError::Validation(format!(
                "module {} already has a field named {name:?}",
                input.module_id
            )));
        }

        let data_type = catalog
            .resolve(&input.data_type_id)
            .map_err(|_| RegistryError::Validation(format!("unknown data type {}", input.data_type_id)))?;
        if !data_type.is_active {
            return Err(RegistryError::Validation(format!(
                "data type {} is inactive",
                data_type.id
            )));
        }

        if let Some(schema) = &input.type_schema {
            if data_type.kind != DataKind::Array {
                return Err(RegistryError::Validation(format!(
                    "type schema given for field {name:?} of kind {}",
                    data_type.kind
                )));
            }
            check_item_schema(&name, schema, catalog)?;
        }

        let now = modflow_model::now_millis();
        Ok(Field {
            id,
            name,
            module_id: input.module_id,
            data_type_id: input.data_type_id,
            is_label: input.is_label,
            type_schema: input.type_schema,
            created_at: now,
            updated_at: now,
        })
    }

    /// Inserts a built field, unsetting any previous label of its module.
    pub(crate) fn insert(&mut self, field: Field) {
        let fields = self.by_module.entry(field.module_id.clone()).or_default();
        if field.is_label {
            for other in fields.iter_mut() {
                other.is_label = false;
            }
        }
        self.owner.insert(field.id.clone(), field.module_id.clone());
        fields.push(field);
    }

    pub(crate) fn list(&self, module_id: &ModuleId) -> &[Field] {
        self.by_module.get(module_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn get(&self, module_id: &ModuleId, field_id: &FieldId) -> Option<&Field> {
        self.list(module_id).iter().find(|f| &f.id == field_id)
    }

    pub(crate) fn by_name(&self, module_id: &ModuleId, name: &str) -> Option<&Field> {
        self.list(module_id).iter().find(|f| f.name == name)
    }

    pub(crate) fn label(&self, module_id: &ModuleId) -> Option<&Field> {
        self.list(module_id).iter().find(|f| f.is_label)
    }

    pub(crate) fn set_label(&mut self, module_id: &ModuleId, field_id: &FieldId) -> RegistryResult<Field> {
        let fields = self
            .by_module
            .get_mut(module_id)
            .filter(|fields| fields.iter().any(|f| &f.id == field_id))
            .ok_or_else(|| RegistryError::NotFound(format!("field {field_id} of module {module_id}")))?;
        let now = modflow_model::now_millis();
        let mut labelled = None;
        for field in fields.iter_mut() {
            let is_target = &field.id == field_id;
            if field.is_label != is_target {
                field.is_label = is_target;
                field.updated_at = now;
            }
            if is_target {
                labelled = Some(field.clone());
            }
        }
        labelled.ok_or_else(|| RegistryError::NotFound(format!("field {field_id}")))
    }

    pub(crate) fn delete_of(&mut self, module_id: &ModuleId) -> Vec<Field> {
        let removed = self.by_module.remove(module_id).unwrap_or_default();
        for field in &removed {
            self.owner.remove(&field.id);
        }
        removed
    }

    pub(crate) fn delete_typed_by(&mut self, data_type_id: &DataTypeId) -> Vec<Field> {
        let mut removed = Vec::new();
        for fields in self.by_module.values_mut() {
            let (gone, kept): (Vec<Field>, Vec<Field>) =
                fields.drain(..).partition(|f| &f.data_type_id == data_type_id);
            *fields = kept;
            removed.extend(gone);
        }
        for field in &removed {
            self.owner.remove(&field.id);
        }
        removed
    }
}

fn check_item_schema(field: &str, schema: &[FieldSchema], catalog: &TypeCatalog) -> RegistryResult<()> {
    let mut seen = std::collections::HashSet::new();
    for entry in schema {
        if entry.name.trim().is_empty() {
            return Err(RegistryError::Validation(format!("item subfield of {field:?} needs a name")));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(RegistryError::Validation(format!(
                "item subfield {:?} of {field:?} is declared twice",
                entry.name
            )));
        }
        let kind = catalog
            .resolve(&entry.data_type_id)
            .map_err(|_| {
                RegistryError::Validation(format!(
                    "item subfield {:?} of {field:?} has unknown data type {}",
                    entry.name, entry.data_type_id
                ))
            })?
            .kind;
        if kind == DataKind::Array {
            return Err(RegistryError::Validation(format!(
                "item subfield {:?} of {field:?} cannot itself be an array",
                entry.name
            )));
        }
    }
    Ok(())
}
