//! Record CRUD with validation and rule propagation.

use crate::{
    EngineConfig, EngineError, EngineResult, EvaluationReport, RuleError, RuleEvaluator,
    RuleOutcome, RuleStatus,
};
use modflow_model::{ModuleData, validate_record};
use modflow_registry::{Registry, SchemaSource};
use modflow_storage::RecordStore;
use modflow_types::{EventType, ModuleId, RecordId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// A committed record write and everything it caused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordChange {
    /// The record as written (as it was, for deletes).
    pub record: ModuleData,
    pub report: EvaluationReport,
}

/// The write path for module records.
///
/// Every write runs in four steps: validate the data against the module's
/// fields, run the event's `validate` rules against the candidate, commit
/// the write, then propagate. Failures in the first two steps reject the
/// write; failures while propagating are only reported.
pub struct RecordService {
    registry: Arc<Registry>,
    store: Arc<dyn RecordStore>,
    evaluator: RuleEvaluator,
}

impl RecordService {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        let schema: Arc<dyn SchemaSource> = registry.clone();
        let evaluator = RuleEvaluator::new(schema, Arc::clone(&store), config);
        Self {
            registry,
            store,
            evaluator,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Creates a record in a module.
    pub async fn create_record(
        &self,
        module_id: &ModuleId,
        data: serde_json::Value,
    ) -> EngineResult<RecordChange> {
        let record = ModuleData::new(module_id.clone(), data);
        self.insert_record(record).await
    }

    /// Creates a record with a caller-chosen id and timestamps.
    pub async fn insert_record(&self, mut record: ModuleData) -> EngineResult<RecordChange> {
        let module_id = record.module_id.clone();
        self.validated(&module_id, &mut record.data).await?;
        let prechecked = self.precheck(&module_id, EventType::OnCreate, &record).await?;

        self.store.insert(&record).await?;
        info!("Created record {} in module {}", record.id, module_id);

        let report = self
            .evaluator
            .evaluate(&module_id, EventType::OnCreate, &record, Some(prechecked))
            .await;
        Ok(RecordChange { record, report })
    }

    /// Replaces a record's data.
    pub async fn update_record(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        mut data: serde_json::Value,
    ) -> EngineResult<RecordChange> {
        let before = self.get_record(module_id, record_id).await?;
        self.validated(module_id, &mut data).await?;
        if before.data == data {
            debug!("Record {} unchanged", record_id);
            return Ok(RecordChange {
                record: before,
                report: EvaluationReport::default(),
            });
        }

        let candidate = ModuleData {
            data: data.clone(),
            ..before.clone()
        };
        let prechecked = self.precheck(module_id, EventType::OnUpdate, &candidate).await?;

        let after = self.store.replace_data(module_id, record_id, data).await?;
        info!("Updated record {} in module {}", record_id, module_id);

        let report = self
            .evaluator
            .evaluate(module_id, EventType::OnUpdate, &after, Some(prechecked))
            .await;
        Ok(RecordChange { record: after, report })
    }

    /// Deletes a record.
    pub async fn delete_record(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
    ) -> EngineResult<RecordChange> {
        let record = self.get_record(module_id, record_id).await?;
        let prechecked = self.precheck(module_id, EventType::OnDelete, &record).await?;

        let record = self
            .store
            .delete(module_id, record_id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound(record_id.to_string()))?;
        info!("Deleted record {} from module {}", record_id, module_id);

        let report = self
            .evaluator
            .evaluate(module_id, EventType::OnDelete, &record, Some(prechecked))
            .await;
        Ok(RecordChange { record, report })
    }

    pub async fn get_record(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
    ) -> EngineResult<ModuleData> {
        self.store
            .get(module_id, record_id)
            .await?
            .ok_or_else(|| EngineError::RecordNotFound(record_id.to_string()))
    }

    pub async fn list_records(&self, module_id: &ModuleId) -> EngineResult<Vec<ModuleData>> {
        Ok(self.store.list(module_id).await?)
    }

    /// Display text of a record, read through its module's label field.
    pub async fn label_of(&self, record: &ModuleData) -> String {
        let label = self.registry.label_field(&record.module_id).await;
        let kind = match &label {
            Some(field) => self.registry.data_kind(&field.data_type_id).await,
            None => None,
        };
        record.label(label.as_ref(), kind)
    }

    /// Deletes a module, its fields and its records.
    ///
    /// Records are purged in bulk; their `onDelete` rules do not run.
    pub async fn delete_module(&self, module_id: &ModuleId) -> EngineResult<usize> {
        self.registry.delete_module(module_id).await?;
        let purged = self.store.purge_module(module_id).await?;
        info!("Purged {} records of deleted module {}", purged, module_id);
        Ok(purged)
    }

    async fn validated(
        &self,
        module_id: &ModuleId,
        data: &mut serde_json::Value,
    ) -> EngineResult<()> {
        self.registry.get_module(module_id).await?;
        let fields = self.registry.list_fields(module_id).await;
        let kinds = self.registry.kinds_for(&fields).await;
        validate_record(data, &fields, &kinds).map_err(EngineError::Validation)
    }

    async fn precheck(
        &self,
        module_id: &ModuleId,
        event_type: EventType,
        candidate: &ModuleData,
    ) -> EngineResult<Vec<RuleOutcome>> {
        let outcomes = self.evaluator.precheck(module_id, event_type, candidate).await;
        let rejected: Vec<RuleOutcome> = outcomes
            .iter()
            .filter(|o| matches!(o.status, RuleStatus::Failed(RuleError::CheckFailed(_))))
            .cloned()
            .collect();
        if rejected.is_empty() {
            Ok(outcomes)
        } else {
            info!(
                "{} {} on module {} rejected by {} validate rule(s)",
                event_type,
                candidate.id,
                module_id,
                rejected.len()
            );
            Err(EngineError::Rejected(rejected))
        }
    }
}
