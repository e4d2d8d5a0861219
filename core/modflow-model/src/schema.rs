use modflow_types::{DataTypeId, FieldId, ModuleId};
use serde::{Deserialize, Serialize};

/// Structure of one subfield of an array element.
///
/// Item schemas are one level deep: an entry may not itself be array-typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(alias = "type")]
    pub data_type_id: DataTypeId,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
}

impl FieldSchema {
    /// Shorthand for an optional subfield without validation.
    pub fn new(name: impl Into<String>, data_type_id: DataTypeId) -> Self {
        Self {
            name: name.into(),
            data_type_id,
            required: false,
            default_value: None,
            validation: None,
        }
    }

    /// Marks the subfield as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the value filled in when an element omits the subfield.
    #[must_use]
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Attaches value constraints.
    #[must_use]
    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Constraints checked on array element subfields.
///
/// `min`/`max` bound numbers; `pattern` and `enum` apply to strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

/// A named, typed attribute of a module.
///
/// Records key their data by `name`; rules address fields by `id` so they
/// survive renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub module_id: ModuleId,
    #[serde(alias = "type")]
    pub data_type_id: DataTypeId,
    #[serde(default)]
    pub is_label: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_schema: Option<Vec<FieldSchema>>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Field {
    /// Looks up an item subfield by name.
    #[must_use]
    pub fn item_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.type_schema.as_deref()?.iter().find(|s| s.name == name)
    }
}
