//! Type catalog: the data types fields are typed by.

use crate::{RegistryError, RegistryResult};
use modflow_model::{DataKind, DataType, TypeResolver};
use modflow_types::DataTypeId;
use std::collections::HashMap;
use std::str::FromStr;

pub(crate) const MAX_NAME_LEN: usize = 100;

/// Validates and trims a display name.
pub(crate) fn clean_name(what: &str, name: &str) -> RegistryResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::Validation(format!("{what} name is required")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RegistryError::Validation(format!(
            "{what} name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

#[derive(Debug, Default)]
pub(crate) struct TypeCatalog {
    types: HashMap<DataTypeId, DataType>,
}

impl TypeCatalog {
    pub(crate) fn create(&mut self, name: &str, kind: &str) -> RegistryResult<DataType> {
        let name = clean_name("data type", name)?;
        let kind = DataKind::from_str(kind)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        let data_type = DataType::new(name, kind);
        self.types.insert(data_type.id.clone(), data_type.clone());
        Ok(data_type)
    }

    pub(crate) fn insert(&mut self, data_type: DataType) -> RegistryResult<()> {
        if self.types.contains_key(&data_type.id) {
            return Err(RegistryError::Validation(format!("duplicate data type id {}", data_type.id)));
        }
        self.types.insert(data_type.id.clone(), data_type);
        Ok(())
    }

    pub(crate) fn resolve(&self, id: &DataTypeId) -> RegistryResult<&DataType> {
        self.types
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(format!("data type {id}")))
    }

    pub(crate) fn get_mut(&mut self, id: &DataTypeId) -> RegistryResult<&mut DataType> {
        self.types
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(format!("data type {id}")))
    }

    pub(crate) fn remove(&mut self, id: &DataTypeId) -> RegistryResult<DataType> {
        self.types
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(format!("data type {id}")))
    }

    /// All entries, oldest first.
    pub(crate) fn list(&self) -> Vec<DataType> {
        let mut all: Vec<DataType> = self.types.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

impl TypeResolver for TypeCatalog {
    fn kind_of(&self, id: &DataTypeId) -> Option<DataKind> {
        self.types.get(id).map(|t| t.kind)
    }
}
