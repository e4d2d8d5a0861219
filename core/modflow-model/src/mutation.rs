//! Field mutation primitives.
//!
//! Every mutating rule action reduces to one of these. Stores apply a
//! mutation inside their per-record critical section, so the read of the
//! current value and the write of the result form a single atomic step.

use crate::{MutationError, coerce_number};
use serde::{Deserialize, Serialize};

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A single read-modify-write applied to one field of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum FieldMutation {
    /// Replace the field with a value.
    Set(serde_json::Value),
    /// Add to the numeric value (negative amounts decrement). Missing counts as zero.
    Add(f64),
    /// Multiply the numeric value. Missing counts as zero.
    Multiply(f64),
    /// Divide the numeric value. Dividing by zero is rejected.
    Divide(f64),
}

impl FieldMutation {
    /// Computes the field's new value from its current one.
    pub fn apply(&self, current: Option<&serde_json::Value>) -> Result<serde_json::Value, MutationError> {
        match self {
            FieldMutation::Set(value) => Ok(value.clone()),
            FieldMutation::Add(amount) => number_to_json(current_number(current)? + amount),
            FieldMutation::Multiply(factor) => number_to_json(current_number(current)? * factor),
            FieldMutation::Divide(divisor) => {
                if *divisor == 0.0 {
                    return Err(MutationError::Arithmetic("division by zero".to_string()));
                }
                number_to_json(current_number(current)? / divisor)
            }
        }
    }

    /// True for the arithmetic variants.
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        !matches!(self, FieldMutation::Set(_))
    }
}

fn current_number(current: Option<&serde_json::Value>) -> Result<f64, MutationError> {
    match current {
        None | Some(serde_json::Value::Null) => Ok(0.0),
        Some(value) => coerce_number(value).ok_or_else(|| MutationError::mismatch("number", value)),
    }
}

/// Converts an arithmetic result back to JSON.
///
/// Whole numbers inside the exactly representable range are written as
/// integers so `10 - 3` stays `7` rather than `7.0`.
pub fn number_to_json(n: f64) -> Result<serde_json::Value, MutationError> {
    if !n.is_finite() {
        return Err(MutationError::Arithmetic(format!("non-finite result {n}")));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(serde_json::Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .ok_or_else(|| MutationError::Arithmetic(format!("unrepresentable result {n}")))
}
