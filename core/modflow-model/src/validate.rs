//! Write-time validation of record data against a module's fields.
//!
//! Validation is advisory in one direction only: keys that match no field
//! are kept untouched, and missing top-level fields are allowed. What is
//! present must match its field's kind, and array elements must satisfy the
//! field's item schema. Missing element subfields with a default are filled
//! in place.

use crate::{DataKind, Field, FieldSchema, Value};
use modflow_types::DataTypeId;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Resolves data type ids to their kind.
pub trait TypeResolver {
    fn kind_of(&self, id: &DataTypeId) -> Option<DataKind>;
}

impl TypeResolver for HashMap<DataTypeId, DataKind> {
    fn kind_of(&self, id: &DataTypeId) -> Option<DataKind> {
        self.get(id).copied()
    }
}

/// One reason a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Path of the offending value, e.g. `items[1].qty`.
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validates `data` against `fields`, filling element defaults in place.
///
/// Fields whose data type no longer resolves are not checked.
pub fn validate_record(
    data: &mut serde_json::Value,
    fields: &[Field],
    types: &impl TypeResolver,
) -> Result<(), Vec<FieldViolation>> {
    let Some(object) = data.as_object_mut() else {
        return Err(vec![FieldViolation::new("$", "record data must be a JSON object")]);
    };

    let mut violations = Vec::new();
    for field in fields {
        let Some(raw) = object.get_mut(&field.name) else {
            continue;
        };
        let Some(kind) = types.kind_of(&field.data_type_id) else {
            continue;
        };
        if let Err(e) = Value::typed(raw, kind) {
            violations.push(FieldViolation::new(&field.name, e.to_string()));
            continue;
        }
        if let (DataKind::Array, Some(schema), serde_json::Value::Array(elements)) =
            (kind, field.type_schema.as_deref(), raw)
        {
            for (index, element) in elements.iter_mut().enumerate() {
                let path = format!("{}[{index}]", field.name);
                validate_element(&path, element, schema, types, &mut violations);
            }
        }
    }

    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

fn validate_element(
    path: &str,
    element: &mut serde_json::Value,
    schema: &[FieldSchema],
    types: &impl TypeResolver,
    violations: &mut Vec<FieldViolation>,
) {
    let Some(object) = element.as_object_mut() else {
        violations.push(FieldViolation::new(path, "array element must be an object"));
        return;
    };

    for entry in schema {
        let sub_path = format!("{path}.{}", entry.name);
        let present = object.get(&entry.name).is_some_and(|v| !v.is_null());
        if !present {
            if let Some(default) = &entry.default_value {
                object.insert(entry.name.clone(), default.clone());
            } else if entry.required {
                violations.push(FieldViolation::new(sub_path, "is required"));
            }
            continue;
        }

        let raw = &object[&entry.name];
        let Some(kind) = types.kind_of(&entry.data_type_id) else {
            continue;
        };
        let value = match Value::typed(raw, kind) {
            Ok(value) => value,
            Err(e) => {
                violations.push(FieldViolation::new(sub_path, e.to_string()));
                continue;
            }
        };
        if let Some(rules) = &entry.validation {
            check_constraints(&sub_path, &value, rules, violations);
        }
    }
}

fn check_constraints(
    path: &str,
    value: &Value,
    rules: &crate::FieldValidation,
    violations: &mut Vec<FieldViolation>,
) {
    if let Value::Number(n) = *value {
        if let Some(min) = rules.min.filter(|min| n < *min) {
            violations.push(FieldViolation::new(path, format!("must be at least {min}")));
        }
        if let Some(max) = rules.max.filter(|max| n > *max) {
            violations.push(FieldViolation::new(path, format!("must be at most {max}")));
        }
    }

    let Value::String(text) = value else {
        return;
    };
    if let Some(pattern) = &rules.pattern {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(text) => {}
            Ok(_) => violations.push(FieldViolation::new(path, format!("does not match pattern {pattern}"))),
            Err(e) => violations.push(FieldViolation::new(path, format!("invalid pattern {pattern}: {e}"))),
        }
    }
    if let Some(allowed) = &rules.allowed {
        if !allowed.iter().any(|a| a == text) {
            violations.push(FieldViolation::new(path, format!("must be one of {}", allowed.join(", "))));
        }
    }
}
