//! In-process record store.

use crate::store::{FieldWrite, RecordStore, apply_mutation, check_object};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use modflow_model::{FieldMutation, ModuleData, now_millis};
use modflow_types::{ModuleId, RecordId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Record store held in memory.
///
/// Every write takes the store's write lock for the whole read-modify-write,
/// which serializes concurrent mutations of the same field.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<ModuleId, HashMap<RecordId, ModuleData>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>> {
        let records = self.records.read().await;
        Ok(records.get(module_id).and_then(|m| m.get(record_id)).cloned())
    }

    async fn insert(&self, record: &ModuleData) -> StorageResult<()> {
        check_object(&record.data)?;
        let mut records = self.records.write().await;
        let module = records.entry(record.module_id.clone()).or_default();
        if module.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists(record.id.to_string()));
        }
        module.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn replace_data(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        data: serde_json::Value,
    ) -> StorageResult<ModuleData> {
        check_object(&data)?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(module_id)
            .and_then(|m| m.get_mut(record_id))
            .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;
        record.data = data;
        record.updated_at = now_millis().max(record.updated_at);
        Ok(record.clone())
    }

    async fn mutate_field(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        field: &str,
        mutation: &FieldMutation,
    ) -> StorageResult<FieldWrite> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(module_id)
            .and_then(|m| m.get_mut(record_id))
            .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;
        apply_mutation(record, field, mutation)
    }

    async fn delete(&self, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(module_id).and_then(|m| m.remove(record_id)))
    }

    async fn list(&self, module_id: &ModuleId) -> StorageResult<Vec<ModuleData>> {
        let records = self.records.read().await;
        let mut list: Vec<ModuleData> = records
            .get(module_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn count(&self, module_id: &ModuleId) -> StorageResult<usize> {
        Ok(self.records.read().await.get(module_id).map_or(0, HashMap::len))
    }

    async fn purge_module(&self, module_id: &ModuleId) -> StorageResult<usize> {
        let mut records = self.records.write().await;
        Ok(records.remove(module_id).map_or(0, |m| m.len()))
    }
}
