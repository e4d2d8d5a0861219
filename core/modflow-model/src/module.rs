use modflow_types::{EventType, ModuleId, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tenant-defined record type.
///
/// Fields are stored separately, scoped by module id. The module owns the
/// relationships for which it is the base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Module {
    /// Creates a module with a fresh id and no relationships.
    pub fn new(name: impl Into<String>) -> Self {
        let now = crate::now_millis();
        Self {
            id: ModuleId::new(),
            name: name.into(),
            relationships: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A directed edge from a base module to a target module.
///
/// The target may be the base itself, and edges may form cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    #[serde(default, rename = "relationshipId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub base_module: ModuleId,
    pub target_module: ModuleId,
    #[serde(default)]
    pub binding: TargetBinding,
    #[serde(default)]
    pub event_rules: EventRules,
}

impl Relationship {
    /// Creates an edge with no rules and the default binding.
    pub fn new(base_module: ModuleId, target_module: ModuleId) -> Self {
        Self {
            id: None,
            base_module,
            target_module,
            binding: TargetBinding::default(),
            event_rules: EventRules::default(),
        }
    }

    /// Sets the target binding.
    #[must_use]
    pub fn with_binding(mut self, binding: TargetBinding) -> Self {
        self.binding = binding;
        self
    }

    /// Appends a rule to the list for `event`.
    #[must_use]
    pub fn with_rule(mut self, event: EventType, rule: EventRule) -> Self {
        self.event_rules.rules_for_mut(event).push(rule);
        self
    }

    /// Total number of rules across all event types.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        EventType::ALL.iter().map(|e| self.event_rules.rules_for(*e).len()).sum()
    }
}

/// Rule lists keyed by lifecycle event. Absent lists mean "no rules".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRules {
    #[serde(default, rename = "onCreate", skip_serializing_if = "Vec::is_empty")]
    pub on_create: Vec<EventRule>,
    #[serde(default, rename = "onUpdate", skip_serializing_if = "Vec::is_empty")]
    pub on_update: Vec<EventRule>,
    #[serde(default, rename = "onDelete", skip_serializing_if = "Vec::is_empty")]
    pub on_delete: Vec<EventRule>,
}

impl EventRules {
    /// Rules to run for `event`, in authored order.
    #[must_use]
    pub fn rules_for(&self, event: EventType) -> &[EventRule] {
        match event {
            EventType::OnCreate => &self.on_create,
            EventType::OnUpdate => &self.on_update,
            EventType::OnDelete => &self.on_delete,
        }
    }

    fn rules_for_mut(&mut self, event: EventType) -> &mut Vec<EventRule> {
        match event {
            EventType::OnCreate => &mut self.on_create,
            EventType::OnUpdate => &mut self.on_update,
            EventType::OnDelete => &mut self.on_delete,
        }
    }
}

/// A declarative action run when a lifecycle event hits the base module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRule {
    pub action: RuleAction,
    /// Field name on the triggering record, or `item.<name>` for array projections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    /// `$<moduleId>-$<fieldId>` of the field to mutate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    /// Literal operand, or the comparison operator of a `validate` rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Literal amount for arithmetic actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<serde_json::Value>,
    /// Source fields captured by `snapshot`; empty captures the whole record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Overrides the relationship's binding for this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<TargetBinding>,
}

impl EventRule {
    /// Creates a rule with only an action set.
    pub fn new(action: RuleAction) -> Self {
        Self {
            action,
            source_field: None,
            target_field: None,
            value: None,
            delta: None,
            fields: Vec::new(),
            binding: None,
        }
    }

    /// Sets the source field.
    #[must_use]
    pub fn source(mut self, field: impl Into<String>) -> Self {
        self.source_field = Some(field.into());
        self
    }

    /// Sets the target field reference.
    #[must_use]
    pub fn target(mut self, reference: impl Into<String>) -> Self {
        self.target_field = Some(reference.into());
        self
    }

    /// Sets the literal operand.
    #[must_use]
    pub fn value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the arithmetic amount.
    #[must_use]
    pub fn delta(mut self, delta: serde_json::Value) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Restricts a snapshot to the given source fields.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the target binding.
    #[must_use]
    pub fn binding(mut self, binding: TargetBinding) -> Self {
        self.binding = Some(binding);
        self
    }
}

/// What a rule does to its target.
///
/// Unknown action names are kept verbatim so documents written by newer
/// authoring tools still load; the evaluator skips them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleAction {
    Increment,
    Decrement,
    Set,
    Multiply,
    Divide,
    Snapshot,
    CascadeDelete,
    Validate,
    Other(String),
}

impl RuleAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RuleAction::Increment => "increment",
            RuleAction::Decrement => "decrement",
            RuleAction::Set => "set",
            RuleAction::Multiply => "multiply",
            RuleAction::Divide => "divide",
            RuleAction::Snapshot => "snapshot",
            RuleAction::CascadeDelete => "cascadeDelete",
            RuleAction::Validate => "validate",
            RuleAction::Other(name) => name,
        }
    }

    /// True for actions that need a `targetField`.
    #[must_use]
    pub fn needs_target_field(&self) -> bool {
        !matches!(self, RuleAction::CascadeDelete | RuleAction::Other(_))
    }
}

impl From<String> for RuleAction {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "increment" => RuleAction::Increment,
            "decrement" => RuleAction::Decrement,
            "set" => RuleAction::Set,
            "multiply" => RuleAction::Multiply,
            "divide" => RuleAction::Divide,
            "snapshot" => RuleAction::Snapshot,
            "cascadeDelete" | "cascade_delete" | "cascadedelete" => RuleAction::CascadeDelete,
            "validate" => RuleAction::Validate,
            _ => RuleAction::Other(raw),
        }
    }
}

impl From<RuleAction> for String {
    fn from(action: RuleAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which target record(s) a rule mutates.
///
/// Relationships carry one binding; individual rules may override it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TargetBinding {
    /// The target module's only record. Zero or several records skip the rule.
    #[default]
    Sole,
    /// A fixed record.
    Record {
        #[serde(rename = "recordId")]
        record_id: RecordId,
    },
    /// The triggering record itself.
    Source,
    /// The record whose id is held by a source field (`item.<name>` allowed).
    ForeignKey {
        #[serde(rename = "sourceField")]
        source_field: String,
    },
    /// Every target record whose `target_field` equals the source field's value.
    Match {
        #[serde(rename = "sourceField")]
        source_field: String,
        #[serde(rename = "targetField")]
        target_field: String,
    },
}
