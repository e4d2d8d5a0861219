//! The rule evaluator.
//!
//! One root lifecycle event is evaluated as a breadth-first walk over an
//! explicit work queue. Every target mutation that changes a record queues
//! an `onUpdate` event for it (`onDelete` for cascaded deletes); the walk
//! stops at the depth bound, and a visited set keyed by
//! `(module, record, event)` keeps each record event from running twice in
//! one chain. Rules run strictly in declared order and one at a time.

use crate::action::{self, Comparison};
use crate::binding::{self, Miss};
use crate::{
    EngineConfig, EvaluationReport, EvaluationWarning, RuleError, RuleOutcome, RuleStatus, SkipReason,
};
use modflow_model::{
    DataKind, EventRule, Field, FieldMutation, ItemValue, ModuleData, Relationship, RuleAction,
    SourceRef, SourceValue, TargetRef, resolve_source_value,
};
use modflow_registry::SchemaSource;
use modflow_storage::RecordStore;
use modflow_types::{EventType, ModuleId, RecordId};
use serde_json::Value as Json;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

type VisitKey = (ModuleId, RecordId, EventType);

/// A lifecycle event waiting to be evaluated.
#[derive(Debug, Clone)]
struct Trigger {
    module_id: ModuleId,
    event_type: EventType,
    record: ModuleData,
    depth: usize,
}

impl Trigger {
    fn key(&self) -> VisitKey {
        (self.module_id.clone(), self.record.id.clone(), self.event_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Only `validate` rules, against a write that has not happened yet.
    Precheck,
    /// Everything; `checks` is false when the root's validate rules already ran.
    Propagate { checks: bool },
}

/// State of one root evaluation.
struct Run {
    outcomes: Vec<RuleOutcome>,
    warnings: Vec<EvaluationWarning>,
    queue: VecDeque<Trigger>,
    visited: HashSet<VisitKey>,
    deadline: Instant,
    timeout_ms: u64,
    timed_out: bool,
    max_depth: usize,
}

impl Run {
    fn new(config: &EngineConfig, max_depth: usize) -> Self {
        Self {
            outcomes: Vec::new(),
            warnings: Vec::new(),
            queue: VecDeque::new(),
            visited: HashSet::new(),
            deadline: Instant::now() + Duration::from_millis(config.timeout_ms),
            timeout_ms: config.timeout_ms,
            timed_out: false,
            max_depth,
        }
    }

    fn expired(&mut self) -> bool {
        if !self.timed_out && Instant::now() >= self.deadline {
            warn!("Rule evaluation exceeded {} ms; skipping remaining rules", self.timeout_ms);
            self.timed_out = true;
            self.warnings.push(EvaluationWarning::TimedOut { timeout_ms: self.timeout_ms });
        }
        self.timed_out
    }

    /// Queues a follow-up event unless the chain already ran it or it is too deep.
    ///
    /// An event still waiting in the queue absorbs the newer record state.
    fn schedule(&mut self, module_id: &ModuleId, event_type: EventType, record: ModuleData, depth: usize) {
        if let Some(pending) = self
            .queue
            .iter_mut()
            .find(|t| t.event_type == event_type && &t.module_id == module_id && t.record.id == record.id)
        {
            pending.record = record;
            return;
        }
        if depth > self.max_depth {
            warn!(
                "Propagation depth {} exceeds limit {} at {} {} {}",
                depth, self.max_depth, module_id, record.id, event_type
            );
            self.warnings.push(EvaluationWarning::CycleLimitExceeded {
                module_id: module_id.clone(),
                record_id: record.id,
                event_type,
                depth,
            });
            return;
        }
        if self.visited.contains(&(module_id.clone(), record.id.clone(), event_type)) {
            debug!("Suppressed revisit of {} {} {}", module_id, record.id, event_type);
            self.warnings.push(EvaluationWarning::RevisitSuppressed {
                module_id: module_id.clone(),
                record_id: record.id,
                event_type,
            });
            return;
        }
        self.queue.push_back(Trigger {
            module_id: module_id.clone(),
            event_type,
            record,
            depth,
        });
    }

    fn into_report(self) -> EvaluationReport {
        EvaluationReport {
            outcomes: self.outcomes,
            warnings: self.warnings,
        }
    }
}

/// Where a rule writes.
struct TargetField {
    name: String,
    kind: Option<DataKind>,
}

/// One operand of a rule: the whole record, or one array element.
struct Application {
    item: Option<ItemValue>,
    operand: Option<Json>,
}

/// Everything a rule application needs to know about its relationship.
struct RuleScope<'a> {
    trigger: &'a Trigger,
    relationship_index: usize,
    relationship: &'a Relationship,
    fields: &'a [Field],
    rule_index: usize,
    rule: &'a EventRule,
}

impl RuleScope<'_> {
    fn outcome(&self, item_index: Option<usize>, target_record: Option<RecordId>, status: RuleStatus) -> RuleOutcome {
        RuleOutcome {
            module_id: self.trigger.module_id.clone(),
            record_id: self.trigger.record.id.clone(),
            event_type: self.trigger.event_type,
            relationship_index: self.relationship_index,
            relationship_id: self.relationship.id.clone(),
            rule_index: self.rule_index,
            action: self.rule.action.clone(),
            item_index,
            target_record,
            depth: self.trigger.depth,
            status,
        }
    }

    fn target_module(&self) -> &ModuleId {
        &self.relationship.target_module
    }
}

/// Evaluates relationship rules for record lifecycle events.
pub struct RuleEvaluator {
    schema: Arc<dyn SchemaSource>,
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
}

impl RuleEvaluator {
    /// Creates an evaluator over a schema source and a record store.
    pub fn new(schema: Arc<dyn SchemaSource>, store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        Self { schema, store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `onCreate` rules for a record that has been stored.
    pub async fn on_record_created(&self, module_id: &ModuleId, record: &ModuleData) -> EvaluationReport {
        self.evaluate(module_id, EventType::OnCreate, record, None).await
    }

    /// Runs `onUpdate` rules for a record that has been rewritten.
    ///
    /// An update that leaves the data unchanged runs nothing.
    pub async fn on_record_updated(
        &self,
        module_id: &ModuleId,
        before: &ModuleData,
        after: &ModuleData,
    ) -> EvaluationReport {
        if before.data == after.data {
            debug!("Record {} unchanged; no onUpdate rules run", after.id);
            return EvaluationReport::default();
        }
        self.evaluate(module_id, EventType::OnUpdate, after, None).await
    }

    /// Runs `onDelete` rules for a record that has been removed.
    pub async fn on_record_deleted(&self, module_id: &ModuleId, record: &ModuleData) -> EvaluationReport {
        self.evaluate(module_id, EventType::OnDelete, record, None).await
    }

    /// Runs the `validate` rules of an event against a candidate record
    /// before it is written. Nothing is mutated.
    ///
    /// A write should be rejected when any returned outcome failed with
    /// [`RuleError::CheckFailed`].
    pub async fn precheck(
        &self,
        module_id: &ModuleId,
        event_type: EventType,
        candidate: &ModuleData,
    ) -> Vec<RuleOutcome> {
        let mut run = Run::new(&self.config, 0);
        let trigger = Trigger {
            module_id: module_id.clone(),
            event_type,
            record: candidate.clone(),
            depth: 0,
        };
        self.evaluate_trigger(&mut run, &trigger, Mode::Precheck).await;
        run.outcomes
    }

    /// Evaluates one root event and everything it propagates to.
    ///
    /// `prechecked` carries the outcomes of an earlier [`precheck`](Self::precheck)
    /// of the same event; the root's validate rules are then not run again.
    pub async fn evaluate(
        &self,
        module_id: &ModuleId,
        event_type: EventType,
        record: &ModuleData,
        prechecked: Option<Vec<RuleOutcome>>,
    ) -> EvaluationReport {
        let max_depth = match self.config.max_depth {
            Some(depth) => depth,
            None => self.schema.relationship_count().await,
        };
        let mut run = Run::new(&self.config, max_depth);
        let root_checks = prechecked.is_none();
        run.outcomes.extend(prechecked.unwrap_or_default());
        run.queue.push_back(Trigger {
            module_id: module_id.clone(),
            event_type,
            record: record.clone(),
            depth: 0,
        });

        while let Some(trigger) = run.queue.pop_front() {
            run.visited.insert(trigger.key());
            let checks = root_checks || trigger.depth > 0;
            self.evaluate_trigger(&mut run, &trigger, Mode::Propagate { checks }).await;
        }

        let report = run.into_report();
        debug!(
            "Evaluated {} {} on {}: {} outcomes, {} warnings",
            event_type,
            record.id,
            module_id,
            report.outcomes.len(),
            report.warnings.len()
        );
        report
    }

    async fn evaluate_trigger(&self, run: &mut Run, trigger: &Trigger, mode: Mode) {
        let relationships = self.schema.relationships_from(&trigger.module_id).await;
        if relationships
            .iter()
            .all(|r| r.event_rules.rules_for(trigger.event_type).is_empty())
        {
            return;
        }
        debug!(
            "Evaluating {} on {} {} at depth {}",
            trigger.event_type, trigger.module_id, trigger.record.id, trigger.depth
        );
        let fields = self.schema.list_fields(&trigger.module_id).await;

        for (relationship_index, relationship) in relationships.iter().enumerate() {
            let rules = relationship.event_rules.rules_for(trigger.event_type);
            if rules.is_empty() {
                continue;
            }
            let dangling = !self.schema.module_exists(&relationship.target_module).await;
            if dangling {
                warn!(
                    "Relationship {} of module {} targets missing module {}",
                    relationship_index, trigger.module_id, relationship.target_module
                );
                run.warnings.push(EvaluationWarning::DanglingTarget {
                    module_id: trigger.module_id.clone(),
                    relationship_index,
                    target_module: relationship.target_module.clone(),
                });
            }

            for (rule_index, rule) in rules.iter().enumerate() {
                let is_check = rule.action == RuleAction::Validate;
                match mode {
                    Mode::Precheck if !is_check => continue,
                    Mode::Propagate { checks: false } if is_check => continue,
                    _ => {}
                }
                let scope = RuleScope {
                    trigger,
                    relationship_index,
                    relationship,
                    fields: &fields,
                    rule_index,
                    rule,
                };
                if run.expired() {
                    run.outcomes.push(scope.outcome(None, None, RuleStatus::Skipped(SkipReason::Timeout)));
                    continue;
                }
                if dangling {
                    let reason = SkipReason::NotFound(format!("module {}", relationship.target_module));
                    run.outcomes.push(scope.outcome(None, None, RuleStatus::Skipped(reason)));
                    continue;
                }
                self.apply_rule(run, &scope).await;
            }
        }
    }

    async fn apply_rule(&self, run: &mut Run, scope: &RuleScope<'_>) {
        let rule = scope.rule;
        if let RuleAction::Other(name) = &rule.action {
            let reason = SkipReason::UnknownAction(name.clone());
            run.outcomes.push(scope.outcome(None, None, RuleStatus::Skipped(reason)));
            return;
        }

        let prepared = match self.target_field(scope).await {
            Ok(target) => self.applications(scope).map(|(source, apps)| (target, source, apps)),
            Err(miss) => Err(miss),
        };
        let (target, source, applications) = match prepared {
            Ok(prepared) => prepared,
            Err(miss) => {
                run.outcomes.push(scope.outcome(None, None, miss.into_status()));
                return;
            }
        };
        if applications.is_empty() {
            run.outcomes.push(scope.outcome(None, None, RuleStatus::Skipped(SkipReason::NoItems)));
            return;
        }

        let coalesce = self.config.coalesce_item_arithmetic
            && matches!(rule.action, RuleAction::Increment | RuleAction::Decrement)
            && applications.iter().any(|a| a.item.is_some());
        if let (true, Some(target)) = (coalesce, target.as_ref()) {
            self.apply_coalesced(run, scope, target, &applications).await;
            return;
        }

        for application in &applications {
            self.apply_one(run, scope, target.as_ref(), source.as_ref(), application).await;
        }
    }

    /// Parses and resolves the rule's `targetField`. `None` for cascades.
    async fn target_field(&self, scope: &RuleScope<'_>) -> Result<Option<TargetField>, Miss> {
        if !scope.rule.action.needs_target_field() {
            return Ok(None);
        }
        let raw = scope.rule.target_field.as_deref().ok_or(RuleError::MissingTargetField)?;
        let target = TargetRef::parse(raw)?;
        if target.module_id() != scope.target_module() {
            return Err(RuleError::TargetModuleMismatch {
                expected: scope.target_module().clone(),
                found: target.module_id().clone(),
            }
            .into());
        }
        let field = self
            .schema
            .get_field(target.module_id(), target.field_id())
            .await
            .ok_or_else(|| SkipReason::NotFound(format!("field {target}")))?;
        let kind = self.schema.data_kind(&field.data_type_id).await;
        Ok(Some(TargetField { name: field.name, kind }))
    }

    /// Resolves the rule's operands, one per array element for item sources.
    ///
    /// The fan-out follows the rule's `sourceField`, or the binding's key
    /// source when only that one is item-addressed.
    fn applications(&self, scope: &RuleScope<'_>) -> Result<(Option<SourceRef>, Vec<Application>), Miss> {
        let rule = scope.rule;
        let record = &scope.trigger.record;
        let source = rule.source_field.as_deref().map(SourceRef::parse).transpose()?;
        let key_source = binding::key_source(self.binding(scope))
            .map(SourceRef::parse)
            .transpose()?;

        let fan_out = match (&source, key_source) {
            (Some(s), _) if s.is_item() => Some(s.clone()),
            (_, Some(k)) if k.is_item() => Some(k),
            _ => None,
        };

        let operand = |element: Option<&Json>| match &source {
            Some(s) => s.read_in(record, element),
            None => action::literal_operand(rule),
        };

        let Some(fan_out) = fan_out else {
            return Ok((source.clone(), vec![Application { item: None, operand: operand(None) }]));
        };
        let applications = match resolve_source_value(record, &fan_out, scope.fields)? {
            SourceValue::Items { items, .. } => items
                .into_iter()
                .map(|item| Application {
                    operand: operand(Some(&item.element)),
                    item: Some(item),
                })
                .collect(),
            SourceValue::Single(value) => vec![Application { item: None, operand: value }],
        };
        Ok((source, applications))
    }

    fn binding<'a>(&self, scope: &'a RuleScope<'_>) -> &'a modflow_model::TargetBinding {
        scope.rule.binding.as_ref().unwrap_or(&scope.relationship.binding)
    }

    async fn apply_one(
        &self,
        run: &mut Run,
        scope: &RuleScope<'_>,
        target: Option<&TargetField>,
        source: Option<&SourceRef>,
        application: &Application,
    ) {
        let rule = scope.rule;
        let item_index = application.item.as_ref().map(|i| i.index);
        let record = &scope.trigger.record;

        let operand = match rule.action {
            RuleAction::Snapshot => Some(action::snapshot_value(record, source, application.item.as_ref(), &rule.fields)),
            _ => application.operand.clone().filter(|v| !v.is_null()),
        };
        let needs_operand = !matches!(rule.action, RuleAction::CascadeDelete | RuleAction::Validate);
        if needs_operand && operand.is_none() {
            let status = match &rule.source_field {
                Some(raw) => RuleStatus::Skipped(SkipReason::MissingSource(raw.clone())),
                None => RuleStatus::Failed(RuleError::MissingOperand),
            };
            run.outcomes.push(scope.outcome(item_index, None, status));
            return;
        }

        let element = application.item.as_ref().map(|i| &i.element);
        let targets = binding::resolve_targets(
            self.binding(scope),
            scope.target_module(),
            record,
            element,
            self.store.as_ref(),
            self.schema.as_ref(),
        )
        .await;
        let targets = match targets {
            Ok(targets) => targets,
            Err(miss) => {
                run.outcomes.push(scope.outcome(item_index, None, miss.into_status()));
                return;
            }
        };

        for target_record in targets {
            let status = match self
                .act(run, scope, target, operand.as_ref(), &target_record)
                .await
            {
                Ok(status) => status,
                Err(miss) => miss.into_status(),
            };
            run.outcomes.push(scope.outcome(item_index, Some(target_record.id), status));
        }
    }

    /// Performs the rule's action on one target record.
    async fn act(
        &self,
        run: &mut Run,
        scope: &RuleScope<'_>,
        target: Option<&TargetField>,
        operand: Option<&Json>,
        target_record: &ModuleData,
    ) -> Result<RuleStatus, Miss> {
        let rule = scope.rule;
        let module_id = scope.target_module();

        if rule.action == RuleAction::CascadeDelete {
            let deleted = self
                .store
                .delete(module_id, &target_record.id)
                .await?
                .ok_or_else(|| SkipReason::NotFound(format!("record {} in module {module_id}", target_record.id)))?;
            debug!("Cascade deleted {} from {}", deleted.id, module_id);
            run.schedule(module_id, EventType::OnDelete, deleted, scope.trigger.depth + 1);
            return Ok(RuleStatus::Applied { changed: true });
        }

        let target = target.ok_or(RuleError::MissingTargetField)?;
        if rule.action == RuleAction::Validate {
            Comparison::from_rule(rule.value.as_ref())?.check(operand, target_record.get(&target.name))?;
            return Ok(RuleStatus::Applied { changed: false });
        }

        let operand = operand.ok_or(RuleError::MissingOperand)?;
        let mutation = action::mutation_for(&rule.action, operand)?;
        if let FieldMutation::Set(value) = &mutation {
            action::check_kind(value, target.kind)?;
        } else if mutation.is_arithmetic() {
            action::check_numeric(target.kind)?;
        }
        self.write(run, scope, &target_record.id, &target.name, &mutation).await
    }

    async fn write(
        &self,
        run: &mut Run,
        scope: &RuleScope<'_>,
        record_id: &RecordId,
        field: &str,
        mutation: &FieldMutation,
    ) -> Result<RuleStatus, Miss> {
        let module_id = scope.target_module();
        let write = self.store.mutate_field(module_id, record_id, field, mutation).await?;
        if write.changed {
            debug!("{} {}.{}: {:?} -> {}", module_id, record_id, field, write.previous, write.current);
            run.schedule(module_id, EventType::OnUpdate, write.record, scope.trigger.depth + 1);
        }
        Ok(RuleStatus::Applied { changed: write.changed })
    }

    /// Sums item-sourced increments and decrements per target record and
    /// writes each sum once.
    async fn apply_coalesced(
        &self,
        run: &mut Run,
        scope: &RuleScope<'_>,
        target: &TargetField,
        applications: &[Application],
    ) {
        if let Err(e) = action::check_numeric(target.kind) {
            for application in applications {
                let item_index = application.item.as_ref().map(|i| i.index);
                run.outcomes.push(scope.outcome(item_index, None, RuleStatus::Failed(e.clone())));
            }
            return;
        }
        let record = &scope.trigger.record;
        let mut totals: Vec<(RecordId, f64)> = Vec::new();

        for application in applications {
            let item_index = application.item.as_ref().map(|i| i.index);
            let Some(operand) = application.operand.as_ref().filter(|v| !v.is_null()) else {
                let raw = scope.rule.source_field.clone().unwrap_or_default();
                run.outcomes
                    .push(scope.outcome(item_index, None, RuleStatus::Skipped(SkipReason::MissingSource(raw))));
                continue;
            };
            let amount = match action::signed_amount(&scope.rule.action, operand) {
                Ok(amount) => amount,
                Err(e) => {
                    run.outcomes.push(scope.outcome(item_index, None, RuleStatus::Failed(e)));
                    continue;
                }
            };
            let element = application.item.as_ref().map(|i| &i.element);
            let targets = binding::resolve_targets(
                self.binding(scope),
                scope.target_module(),
                record,
                element,
                self.store.as_ref(),
                self.schema.as_ref(),
            )
            .await;
            match targets {
                Ok(targets) => {
                    for target_record in targets {
                        match totals.iter_mut().find(|(id, _)| *id == target_record.id) {
                            Some((_, total)) => *total += amount,
                            None => totals.push((target_record.id, amount)),
                        }
                    }
                }
                Err(miss) => run.outcomes.push(scope.outcome(item_index, None, miss.into_status())),
            }
        }

        for (record_id, total) in totals {
            let status = match self
                .write(run, scope, &record_id, &target.name, &FieldMutation::Add(total))
                .await
            {
                Ok(status) => status,
                Err(miss) => miss.into_status(),
            };
            run.outcomes.push(scope.outcome(None, Some(record_id), status));
        }
    }
}
