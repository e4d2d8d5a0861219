//! Turning a rule and its operand into a store mutation or a check.

use crate::RuleError;
use modflow_model::{
    DataKind, EventRule, FieldMutation, ItemValue, ModuleData, MutationError, RuleAction, SourceRef,
    Value, coerce_number,
};
use modflow_storage::loosely_equal;
use serde_json::Value as Json;
use std::cmp::Ordering;

/// Operand used when the rule names no source field.
///
/// `delta` wins over `value`; increments and decrements default to 1.
/// A `validate` rule's `value` is its operator, never an operand.
pub(crate) fn literal_operand(rule: &EventRule) -> Option<Json> {
    match rule.action {
        RuleAction::Validate => rule.delta.clone(),
        RuleAction::Increment | RuleAction::Decrement => {
            rule.delta.clone().or_else(|| rule.value.clone()).or(Some(Json::from(1)))
        }
        _ => rule.delta.clone().or_else(|| rule.value.clone()),
    }
}

/// The mutation `action` performs with `operand`.
pub(crate) fn mutation_for(action: &RuleAction, operand: &Json) -> Result<FieldMutation, RuleError> {
    match action {
        RuleAction::Increment => Ok(FieldMutation::Add(number(operand)?)),
        RuleAction::Decrement => Ok(FieldMutation::Add(-number(operand)?)),
        RuleAction::Multiply => Ok(FieldMutation::Multiply(number(operand)?)),
        RuleAction::Divide => {
            let divisor = number(operand)?;
            if divisor == 0.0 {
                return Err(MutationError::Arithmetic("division by zero".to_string()).into());
            }
            Ok(FieldMutation::Divide(divisor))
        }
        RuleAction::Set | RuleAction::Snapshot => Ok(FieldMutation::Set(operand.clone())),
        other => Err(RuleError::InvalidOperand(format!("{other} does not mutate a field"))),
    }
}

/// Signed amount an increment or decrement adds, for coalescing.
pub(crate) fn signed_amount(action: &RuleAction, operand: &Json) -> Result<f64, RuleError> {
    let n = number(operand)?;
    Ok(if *action == RuleAction::Decrement { -n } else { n })
}

fn number(operand: &Json) -> Result<f64, RuleError> {
    coerce_number(operand).ok_or_else(|| MutationError::mismatch("number", operand).into())
}

/// Rejects `set` values that do not fit the target field's kind.
pub(crate) fn check_kind(value: &Json, kind: Option<DataKind>) -> Result<(), RuleError> {
    match kind {
        Some(kind) => Value::typed(value, kind).map(|_| ()).map_err(RuleError::from),
        None => Ok(()),
    }
}

/// Rejects arithmetic against a field typed as anything but a number.
pub(crate) fn check_numeric(kind: Option<DataKind>) -> Result<(), RuleError> {
    match kind {
        Some(kind) if kind != DataKind::Number => Err(MutationError::TypeMismatch {
            expected: DataKind::Number.to_string(),
            found: kind.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// The value a `snapshot` rule copies into its target field.
///
/// Captures the array element for item sources, the named field for plain
/// sources and the whole record data otherwise, narrowed to `fields` when
/// the captured value is an object.
pub(crate) fn snapshot_value(
    record: &ModuleData,
    source: Option<&SourceRef>,
    item: Option<&ItemValue>,
    fields: &[String],
) -> Json {
    let captured = match (item, source) {
        (Some(item), _) => item.element.clone(),
        (None, Some(source)) => source.read_in(record, None).unwrap_or(Json::Null),
        (None, None) => record.data.clone(),
    };
    match captured {
        Json::Object(object) if !fields.is_empty() => Json::Object(
            fields
                .iter()
                .filter_map(|name| object.get(name).map(|v| (name.clone(), v.clone())))
                .collect(),
        ),
        other => other,
    }
}

/// Comparison a `validate` rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
    Exists,
}

impl Comparison {
    /// Reads the operator from a rule's `value`; absent means `lte`.
    pub(crate) fn from_rule(value: Option<&Json>) -> Result<Self, RuleError> {
        let Some(raw) = value else {
            return Ok(Comparison::Lte);
        };
        let name = raw.as_str().ok_or_else(|| RuleError::InvalidOperator(raw.to_string()))?;
        match name.trim().to_ascii_lowercase().as_str() {
            "lt" | "<" => Ok(Comparison::Lt),
            "lte" | "<=" => Ok(Comparison::Lte),
            "gt" | ">" => Ok(Comparison::Gt),
            "gte" | ">=" => Ok(Comparison::Gte),
            "eq" | "==" => Ok(Comparison::Eq),
            "ne" | "!=" => Ok(Comparison::Ne),
            "exists" => Ok(Comparison::Exists),
            _ => Err(RuleError::InvalidOperator(name.to_string())),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Exists => "exists",
        }
    }

    /// Checks `source <op> target`.
    ///
    /// Numbers (numeric strings included) compare numerically, other
    /// strings lexically, which orders ISO dates correctly.
    pub(crate) fn check(self, source: Option<&Json>, target: Option<&Json>) -> Result<(), RuleError> {
        let target = target.filter(|t| !t.is_null());
        if self == Comparison::Exists {
            return match target {
                Some(_) => Ok(()),
                None => Err(RuleError::CheckFailed("target has no value".to_string())),
            };
        }
        let source = source.filter(|s| !s.is_null());
        let passed = match self {
            Comparison::Eq => matches!((source, target), (Some(s), Some(t)) if loosely_equal(s, t)),
            Comparison::Ne => !matches!((source, target), (Some(s), Some(t)) if loosely_equal(s, t)),
            _ => {
                let (Some(s), Some(t)) = (source, target) else {
                    return Err(RuleError::CheckFailed("missing value to compare".to_string()));
                };
                let ordering = order(s, t).ok_or_else(|| {
                    RuleError::InvalidOperand(format!("cannot order {s} against {t}"))
                })?;
                match self {
                    Comparison::Lt => ordering == Ordering::Less,
                    Comparison::Lte => ordering != Ordering::Greater,
                    Comparison::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }
            }
        };
        if passed {
            Ok(())
        } else {
            Err(RuleError::CheckFailed(format!(
                "{} {} {}",
                show(source),
                self.symbol(),
                show(target)
            )))
        }
    }
}

fn order(a: &Json, b: &Json) -> Option<Ordering> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(a.as_str()?.cmp(b.as_str()?)),
    }
}

fn show(value: Option<&Json>) -> String {
    value.map_or_else(|| "null".to_string(), ToString::to_string)
}
