//! The record store interface and the write logic both backends share.

use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use modflow_model::{FieldMutation, ModuleData, coerce_number, now_millis};
use modflow_types::{ModuleId, RecordId};

/// Outcome of a single field write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWrite {
    /// The field's value before the write, `None` when absent.
    pub previous: Option<serde_json::Value>,
    /// The field's value after the write.
    pub current: serde_json::Value,
    /// False when the new value equals the old one; nothing was written.
    pub changed: bool,
    /// The record as stored after the write.
    pub record: ModuleData,
}

/// Persistent storage for module records.
///
/// `mutate_field` is the only write the rule evaluator issues. It must read
/// the current value and store the result as one atomic step with respect
/// to every other write on the same record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Gets a record by id.
    async fn get(&self, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>>;

    /// Inserts a new record. Fails if the id is taken.
    async fn insert(&self, record: &ModuleData) -> StorageResult<()>;

    /// Replaces a record's whole data object.
    async fn replace_data(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        data: serde_json::Value,
    ) -> StorageResult<ModuleData>;

    /// Applies a mutation to one top-level field, atomically.
    async fn mutate_field(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        field: &str,
        mutation: &FieldMutation,
    ) -> StorageResult<FieldWrite>;

    /// Deletes a record, returning it if it existed.
    async fn delete(&self, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>>;

    /// All records of a module, oldest first.
    async fn list(&self, module_id: &ModuleId) -> StorageResult<Vec<ModuleData>>;

    /// Number of records of a module.
    async fn count(&self, module_id: &ModuleId) -> StorageResult<usize> {
        Ok(self.list(module_id).await?.len())
    }

    /// Records of a module whose `field` loosely equals `value`.
    async fn find_by_field(
        &self,
        module_id: &ModuleId,
        field: &str,
        value: &serde_json::Value,
    ) -> StorageResult<Vec<ModuleData>> {
        let records = self.list(module_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.get(field).is_some_and(|v| loosely_equal(v, value)))
            .collect())
    }

    /// Deletes every record of a module, returning how many were removed.
    async fn purge_module(&self, module_id: &ModuleId) -> StorageResult<usize>;
}

/// JSON equality that also treats `"5"`, `5` and `5.0` as equal.
pub fn loosely_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    if a == b {
        return true;
    }
    if a.is_null() || b.is_null() {
        return false;
    }
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Applies `mutation` to `record` in place.
///
/// Leaves the record untouched, `updated_at` included, when the result
/// equals the current value.
pub(crate) fn apply_mutation(
    record: &mut ModuleData,
    field: &str,
    mutation: &FieldMutation,
) -> StorageResult<FieldWrite> {
    let object = record.data.as_object_mut().ok_or_else(|| {
        StorageError::InvalidData(format!("record {} data is not an object", record.id))
    })?;
    let previous = object.get(field).cloned();
    let current = mutation.apply(previous.as_ref())?;
    let changed = previous.as_ref() != Some(&current);
    if changed {
        object.insert(field.to_string(), current.clone());
        record.updated_at = now_millis().max(record.updated_at);
    }
    Ok(FieldWrite {
        previous,
        current,
        changed,
        record: record.clone(),
    })
}

pub(crate) fn check_object(data: &serde_json::Value) -> StorageResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StorageError::InvalidData("record data must be a JSON object".to_string()))
    }
}
