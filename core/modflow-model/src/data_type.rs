use modflow_types::DataTypeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// The fixed set of primitive and composite kinds a data type can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl DataKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataKind::String => "string",
            DataKind::Number => "number",
            DataKind::Boolean => "boolean",
            DataKind::Date => "date",
            DataKind::Array => "array",
            DataKind::Object => "object",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(DataKind::String),
            "number" => Ok(DataKind::Number),
            "boolean" | "bool" => Ok(DataKind::Boolean),
            "date" => Ok(DataKind::Date),
            "array" => Ok(DataKind::Array),
            "object" => Ok(DataKind::Object),
            _ => Err(ModelError::InvalidKind(s.to_string())),
        }
    }
}

/// A type catalog entry.
///
/// The kind is fixed for the lifetime of the entry: existing records were
/// validated against it. Names are free text and need not be unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataType {
    pub id: DataTypeId,
    pub name: String,
    #[serde(alias = "type")]
    pub kind: DataKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_active() -> bool {
    true
}

impl DataType {
    /// Creates an active data type with a fresh id.
    pub fn new(name: impl Into<String>, kind: DataKind) -> Self {
        let now = crate::now_millis();
        Self {
            id: DataTypeId::new(),
            name: name.into(),
            kind,
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
