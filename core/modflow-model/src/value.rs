//! Schema-checked view over record JSON.
//!
//! Records are stored as raw JSON because their shape is decided at runtime.
//! [`Value::typed`] reads a JSON value through a field's [`DataKind`], so the
//! engine works with tagged variants instead of guessing at JSON shapes.

use crate::{DataKind, MutationError};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// A record value interpreted against its field's data kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Interprets `json` as a value of `kind`.
    ///
    /// Numbers accept numeric strings (form inputs arrive as text). Dates
    /// accept RFC 3339 timestamps and plain `YYYY-MM-DD` dates. `null` is
    /// accepted for every kind.
    pub fn typed(json: &serde_json::Value, kind: DataKind) -> Result<Self, MutationError> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Value::Null);
        }
        match kind {
            DataKind::String => match json {
                Json::String(s) => Ok(Value::String(s.clone())),
                other => Err(MutationError::mismatch("string", other)),
            },
            DataKind::Number => coerce_number(json)
                .map(Value::Number)
                .ok_or_else(|| MutationError::mismatch("number", json)),
            DataKind::Boolean => match json {
                Json::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(MutationError::mismatch("boolean", other)),
            },
            DataKind::Date => match json {
                Json::String(s) => parse_date(s)
                    .map(Value::Date)
                    .ok_or_else(|| MutationError::mismatch("date", json)),
                other => Err(MutationError::mismatch("date", other)),
            },
            DataKind::Array => match json {
                Json::Array(items) => Ok(Value::Array(items.iter().map(Value::from_json).collect())),
                other => Err(MutationError::mismatch("array", other)),
            },
            DataKind::Object => match json {
                Json::Object(map) => Ok(Value::Object(
                    map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
                )),
                other => Err(MutationError::mismatch("object", other)),
            },
        }
    }

    /// Interprets `json` without a schema. Strings stay strings.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }

    /// Converts back to JSON. Dates are written as RFC 3339.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => crate::number_to_json(*n).unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Text used when the value labels a record.
    #[must_use]
    pub fn display_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(crate::number_to_json(*n).map_or_else(|_| n.to_string(), |j| j.to_string())),
            Value::Bool(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.to_rfc3339()),
            other => Some(other.to_json().to_string()),
        }
    }
}

/// Reads a JSON value as a finite number, accepting numeric strings.
pub fn coerce_number(json: &serde_json::Value) -> Option<f64> {
    match json {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub(crate) fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
