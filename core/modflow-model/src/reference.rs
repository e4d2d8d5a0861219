//! Field addressing used by event rules.
//!
//! Two wire-stable string forms are persisted inside relationship documents:
//! - `$<moduleId>-$<fieldId>` addresses a field of a module absolutely
//! - `item.<name>` projects `<name>` out of every element of an array field
//!
//! Both are parsed into value objects here and never manipulated as raw
//! strings elsewhere.

use crate::{Field, ModuleData, RefError};
use modflow_types::{FieldId, ModuleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ITEM_PREFIX: &str = "item.";
const RECORD_ID_FIELD: &str = "id";

/// An absolute reference to a field of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetRef {
    module_id: ModuleId,
    field_id: FieldId,
}

impl TargetRef {
    pub fn new(module_id: ModuleId, field_id: FieldId) -> Self {
        Self { module_id, field_id }
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn field_id(&self) -> &FieldId {
        &self.field_id
    }

    /// Parses `$<moduleId>-$<fieldId>`.
    ///
    /// The string must start with `$` and split on `-$` into exactly two
    /// valid identifiers. Identifiers cannot contain `$`, so every string
    /// produced by [`build_target_ref`] parses back to the same pair.
    pub fn parse(raw: &str) -> Result<Self, RefError> {
        let invalid = || RefError::Invalid(raw.to_string());
        let body = raw.strip_prefix('$').ok_or_else(invalid)?;
        let mut parts = body.split("-$");
        let (Some(module), Some(field), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let module_id = ModuleId::parse(module).map_err(|_| invalid())?;
        let field_id = FieldId::parse(field).map_err(|_| invalid())?;
        Ok(Self { module_id, field_id })
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}-${}", self.module_id, self.field_id)
    }
}

impl FromStr for TargetRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetRef {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetRef> for String {
    fn from(r: TargetRef) -> Self {
        r.to_string()
    }
}

/// Builds the wire form of a target reference.
pub fn build_target_ref(module_id: &ModuleId, field_id: &FieldId) -> String {
    format!("${module_id}-${field_id}")
}

/// Parses the wire form of a target reference.
pub fn parse_target_ref(raw: &str) -> Result<TargetRef, RefError> {
    TargetRef::parse(raw)
}

/// Where a rule reads its operand on the triggering record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    /// A top-level field, by name. `id` falls back to the record id.
    Field(String),
    /// A subfield of every element of the module's array field.
    Item(String),
}

impl SourceRef {
    /// Parses a plain field name or `item.<name>`.
    pub fn parse(raw: &str) -> Result<Self, RefError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RefError::Invalid(raw.to_string()));
        }
        match raw.strip_prefix(ITEM_PREFIX) {
            Some(sub) if sub.is_empty() || sub.contains('.') => Err(RefError::Invalid(raw.to_string())),
            Some(sub) => Ok(SourceRef::Item(sub.to_string())),
            None => Ok(SourceRef::Field(raw.to_string())),
        }
    }

    #[must_use]
    pub fn is_item(&self) -> bool {
        matches!(self, SourceRef::Item(_))
    }

    /// Reads this reference from a single array element.
    ///
    /// Plain fields are read from `record`; item subfields from `element`.
    #[must_use]
    pub fn read_in(&self, record: &ModuleData, element: Option<&serde_json::Value>) -> Option<serde_json::Value> {
        match self {
            SourceRef::Field(name) => read_field(record, name),
            SourceRef::Item(sub) => element.and_then(|e| e.get(sub)).cloned(),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Field(name) => f.write_str(name),
            SourceRef::Item(sub) => write!(f, "{ITEM_PREFIX}{sub}"),
        }
    }
}

impl FromStr for SourceRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One element of an item-addressed source.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemValue {
    /// Position in the array.
    pub index: usize,
    /// The whole element, kept for bindings that read sibling subfields.
    pub element: serde_json::Value,
    /// The projected subfield, `None` when the element lacks it.
    pub value: Option<serde_json::Value>,
}

/// A resolved source operand.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    /// A plain field; `None` when the record does not carry it.
    Single(Option<serde_json::Value>),
    /// An item projection over the named array field.
    Items { field: String, items: Vec<ItemValue> },
}

/// Resolves a source reference against a record of the owning module.
///
/// `fields` are the owning module's fields in creation order. An item
/// reference picks the first field whose item schema declares the subfield;
/// a field without an item schema cannot be item-addressed.
pub fn resolve_source_value(
    record: &ModuleData,
    source: &SourceRef,
    fields: &[Field],
) -> Result<SourceValue, RefError> {
    match source {
        SourceRef::Field(name) => Ok(SourceValue::Single(read_field(record, name))),
        SourceRef::Item(sub) => {
            let field = fields
                .iter()
                .find(|f| f.item_schema(sub).is_some())
                .ok_or_else(|| RefError::NoArrayField(sub.clone()))?;
            let items = match record.get(&field.name) {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Array(elements)) => elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| ItemValue {
                        index,
                        element: element.clone(),
                        value: element.get(sub).cloned(),
                    })
                    .collect(),
                Some(_) => return Err(RefError::NotAnArray(field.name.clone())),
            };
            Ok(SourceValue::Items { field: field.name.clone(), items })
        }
    }
}

fn read_field(record: &ModuleData, name: &str) -> Option<serde_json::Value> {
    match record.get(name) {
        Some(value) => Some(value.clone()),
        None if name == RECORD_ID_FIELD => Some(serde_json::Value::String(record.id.to_string())),
        None => None,
    }
}
