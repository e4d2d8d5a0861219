//! Resolving which target record(s) a rule acts on.

use crate::{RuleError, RuleStatus, SkipReason};
use modflow_model::{ModuleData, RefError, SourceRef, TargetBinding, TargetRef};
use modflow_registry::SchemaSource;
use modflow_storage::{RecordStore, StorageError};
use modflow_types::{ModuleId, RecordId};
use serde_json::Value as Json;

/// A rule application that stopped early.
#[derive(Debug)]
pub(crate) enum Miss {
    Skip(SkipReason),
    Fail(RuleError),
}

impl Miss {
    pub(crate) fn into_status(self) -> RuleStatus {
        match self {
            Miss::Skip(reason) => RuleStatus::Skipped(reason),
            Miss::Fail(error) => RuleStatus::Failed(error),
        }
    }
}

impl From<SkipReason> for Miss {
    fn from(reason: SkipReason) -> Self {
        Miss::Skip(reason)
    }
}

impl From<RuleError> for Miss {
    fn from(error: RuleError) -> Self {
        Miss::Fail(error)
    }
}

impl From<RefError> for Miss {
    fn from(error: RefError) -> Self {
        Miss::Fail(error.into())
    }
}

impl From<StorageError> for Miss {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => Miss::Skip(SkipReason::NotFound(what)),
            StorageError::Mutation(e) => Miss::Fail(e.into()),
            other => Miss::Fail(RuleError::Storage(other.to_string())),
        }
    }
}

/// The source field a binding reads the target key from, if any.
pub(crate) fn key_source(binding: &TargetBinding) -> Option<&str> {
    match binding {
        TargetBinding::ForeignKey { source_field } | TargetBinding::Match { source_field, .. } => {
            Some(source_field.as_str())
        }
        _ => None,
    }
}

/// Finds the target records of one rule application.
///
/// `element` is the array element being processed for item-sourced rules;
/// key sources written as `item.<name>` are read from it.
pub(crate) async fn resolve_targets(
    binding: &TargetBinding,
    target_module: &ModuleId,
    record: &ModuleData,
    element: Option<&Json>,
    store: &dyn RecordStore,
    schema: &dyn SchemaSource,
) -> Result<Vec<ModuleData>, Miss> {
    match binding {
        TargetBinding::Sole => {
            let records = store.list(target_module).await?;
            match records.len() {
                0 => Err(SkipReason::NoTargetRecord.into()),
                1 => Ok(records),
                n => Err(SkipReason::AmbiguousTarget(n).into()),
            }
        }
        TargetBinding::Record { record_id } => fetch(store, target_module, record_id).await,
        TargetBinding::Source => fetch(store, target_module, &record.id).await,
        TargetBinding::ForeignKey { source_field } => {
            let key = read_key(source_field, record, element)?;
            let raw = match &key {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            let record_id = RecordId::parse(&raw)
                .map_err(|_| RuleError::InvalidOperand(format!("{source_field} holds no record id: {key}")))?;
            fetch(store, target_module, &record_id).await
        }
        TargetBinding::Match { source_field, target_field } => {
            let key = read_key(source_field, record, element)?;
            let field_name = match target_field.strip_prefix('$') {
                Some(_) => {
                    let target = TargetRef::parse(target_field)?;
                    schema
                        .get_field(target_module, target.field_id())
                        .await
                        .map(|f| f.name)
                        .ok_or_else(|| SkipReason::NotFound(format!("field {target}")))?
                }
                None => target_field.clone(),
            };
            let matches = store.find_by_field(target_module, &field_name, &key).await?;
            if matches.is_empty() {
                return Err(SkipReason::NoTargetRecord.into());
            }
            Ok(matches)
        }
    }
}

async fn fetch(
    store: &dyn RecordStore,
    module_id: &ModuleId,
    record_id: &RecordId,
) -> Result<Vec<ModuleData>, Miss> {
    store
        .get(module_id, record_id)
        .await?
        .map(|r| vec![r])
        .ok_or_else(|| SkipReason::NotFound(format!("record {record_id} in module {module_id}")).into())
}

fn read_key(source_field: &str, record: &ModuleData, element: Option<&Json>) -> Result<Json, Miss> {
    let source = SourceRef::parse(source_field)?;
    source
        .read_in(record, element)
        .filter(|v| !v.is_null())
        .ok_or_else(|| SkipReason::MissingSource(source_field.to_string()).into())
}
