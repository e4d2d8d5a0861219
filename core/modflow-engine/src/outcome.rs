//! What evaluating one lifecycle event reports back.

use modflow_model::{MutationError, RefError, RuleAction};
use modflow_types::{EventType, ModuleId, RecordId};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why a rule did nothing. Skips are expected in a live graph and are
/// never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no target record")]
    NoTargetRecord,

    #[error("{0} candidate target records")]
    AmbiguousTarget(usize),

    #[error("source field {0:?} has no value")]
    MissingSource(String),

    #[error("array source is empty")]
    NoItems,

    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("timeout")]
    Timeout,
}

/// Why a rule failed. A failure affects only its own rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error(transparent)]
    Reference(#[from] RefError),

    #[error("rule has no targetField")]
    MissingTargetField,

    #[error("target {found} is not in target module {expected}")]
    TargetModuleMismatch { expected: ModuleId, found: ModuleId },

    #[error("rule has no operand")]
    MissingOperand,

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("invalid comparison operator {0:?}")]
    InvalidOperator(String),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("check failed: {0}")]
    CheckFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for RuleError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of one rule application.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleStatus {
    /// The action ran. `changed` is false when the target already held the result.
    Applied { changed: bool },
    Skipped(SkipReason),
    Failed(RuleError),
}

impl Serialize for RuleStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            RuleStatus::Applied { changed } => {
                map.serialize_entry("status", "applied")?;
                map.serialize_entry("changed", changed)?;
            }
            RuleStatus::Skipped(reason) => {
                map.serialize_entry("status", "skipped")?;
                map.serialize_entry("reason", reason)?;
            }
            RuleStatus::Failed(reason) => {
                map.serialize_entry("status", "failed")?;
                map.serialize_entry("reason", reason)?;
            }
        }
        map.end()
    }
}

/// One entry of an evaluation report.
///
/// Item-sourced rules produce one outcome per array element, distinguished
/// by `item_index`; rules bound to several target records produce one per
/// target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    /// Module whose event ran the rule.
    pub module_id: ModuleId,
    /// Record whose event ran the rule.
    pub record_id: RecordId,
    pub event_type: EventType,
    pub relationship_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_id: Option<String>,
    pub rule_index: usize,
    pub action: RuleAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_record: Option<RecordId>,
    /// Distance from the root event; 0 for rules the root event ran.
    pub depth: usize,
    #[serde(flatten)]
    pub status: RuleStatus,
}

impl RuleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, RuleStatus::Applied { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RuleStatus::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RuleStatus::Failed(_))
    }
}

/// Conditions worth surfacing that are not attributable to one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EvaluationWarning {
    /// A propagated event was dropped because it exceeded the depth bound.
    #[serde(rename_all = "camelCase")]
    CycleLimitExceeded {
        module_id: ModuleId,
        record_id: RecordId,
        event_type: EventType,
        depth: usize,
    },
    /// A propagated event was dropped because the chain already ran it.
    #[serde(rename_all = "camelCase")]
    RevisitSuppressed {
        module_id: ModuleId,
        record_id: RecordId,
        event_type: EventType,
    },
    /// A relationship targets a module that no longer exists.
    #[serde(rename_all = "camelCase")]
    DanglingTarget {
        module_id: ModuleId,
        relationship_index: usize,
        target_module: ModuleId,
    },
    /// The time budget ran out; remaining rules were skipped.
    #[serde(rename_all = "camelCase")]
    TimedOut { timeout_ms: u64 },
}

/// Everything one root lifecycle event caused.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub outcomes: Vec<RuleOutcome>,
    pub warnings: Vec<EvaluationWarning>,
}

impl EvaluationReport {
    pub fn applied(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.is_applied())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// True when no rule failed and nothing was cut off.
    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none() && self.warnings.is_empty()
    }
}
