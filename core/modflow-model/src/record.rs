use crate::{DataKind, Field, Value};
use modflow_types::{ModuleId, RecordId};
use serde::{Deserialize, Serialize};

/// A record stored for a module.
///
/// `data` is a JSON object keyed by field name. Its shape is checked against
/// the module's fields when written and is never rewritten when the fields
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleData {
    pub id: RecordId,
    pub module_id: ModuleId,
    pub data: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ModuleData {
    /// Creates a record with a fresh id and both timestamps set to now.
    pub fn new(module_id: ModuleId, data: serde_json::Value) -> Self {
        let now = crate::now_millis();
        Self {
            id: RecordId::new(),
            module_id,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Raw value of a top-level field.
    #[must_use]
    pub fn get(&self, field_name: &str) -> Option<&serde_json::Value> {
        self.data.get(field_name)
    }

    /// Human-readable identifier of the record, read through its module's label field.
    ///
    /// Falls back to the record id when the label value is missing or blank.
    #[must_use]
    pub fn label(&self, label_field: Option<&Field>, kind: Option<DataKind>) -> String {
        label_field
            .and_then(|field| self.get(&field.name))
            .and_then(|raw| match kind {
                Some(kind) => Value::typed(raw, kind).ok(),
                None => Some(Value::from_json(raw)),
            })
            .and_then(|value| value.display_text())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.id.to_string())
    }
}
