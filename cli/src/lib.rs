//! Commands behind the `modflow` binary.
//!
//! `main.rs` only parses arguments and installs logging; the commands live
//! here so they can be driven from tests.

use anyhow::{Context, Result};
use clap::Args;
use modflow_engine::{EngineConfig, EvaluationReport, RecordService, RuleEvaluator};
use modflow_model::{ModuleData, TargetRef, build_target_ref};
use modflow_registry::{Registry, SchemaSource};
use modflow_storage::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use modflow_types::{EventType, FieldId, ModuleId, RecordId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Inputs of `modflow apply`.
#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Registry snapshot (data types, modules, fields) as JSON
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Records to load before raising the event, as a JSON array
    #[arg(short, long)]
    pub records: Option<PathBuf>,

    /// Engine configuration as JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database to run against instead of an in-memory store
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Module owning the triggering record
    #[arg(short, long)]
    pub module: ModuleId,

    /// Triggering record
    #[arg(long)]
    pub record: RecordId,

    /// Lifecycle event to raise (onCreate, onUpdate, onDelete)
    #[arg(short, long, default_value = "onCreate")]
    pub event: EventType,

    /// Replacement record data for onUpdate, as JSON
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Include every stored record in the output
    #[arg(long)]
    pub dump: bool,
}

/// What `modflow apply` prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutput {
    pub module_id: ModuleId,
    pub record_id: RecordId,
    pub event_type: EventType,
    pub report: EvaluationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<ModuleData>>,
}

/// Raises one lifecycle event for a stored record and evaluates its rules.
///
/// `onCreate` replays the rules of a record already in the store. `onUpdate`
/// and `onDelete` go through the record service, so the new data is
/// validated and `validate` rules can reject the write.
pub async fn apply(args: &ApplyArgs) -> Result<ApplyOutput> {
    let registry = Arc::new(load_registry(&args.schema)?);
    let config = match &args.config {
        Some(path) => read_json::<EngineConfig>(path)?,
        None => EngineConfig::default(),
    };
    let store = open_store(args.db.as_deref())?;
    if let Some(path) = &args.records {
        let loaded = load_records(path, store.as_ref()).await?;
        info!("Loaded {} records from {}", loaded, path.display());
    }

    registry
        .get_module(&args.module)
        .await
        .with_context(|| format!("Unknown module {}", args.module))?;
    let record = store
        .get(&args.module, &args.record)
        .await?
        .with_context(|| format!("Record {} not found in module {}", args.record, args.module))?;

    let report = match args.event {
        EventType::OnCreate => {
            let schema: Arc<dyn SchemaSource> = registry.clone();
            let evaluator = RuleEvaluator::new(schema, Arc::clone(&store), config);
            evaluator.on_record_created(&args.module, &record).await
        }
        EventType::OnUpdate => {
            let path = args.data.as_ref().context("onUpdate needs --data with the new record data")?;
            let data: serde_json::Value = read_json(path)?;
            let service = RecordService::new(Arc::clone(&registry), Arc::clone(&store), config);
            service.update_record(&args.module, &args.record, data).await?.report
        }
        EventType::OnDelete => {
            let service = RecordService::new(Arc::clone(&registry), Arc::clone(&store), config);
            service.delete_record(&args.module, &args.record).await?.report
        }
    };
    debug!(
        "{} outcomes, {} warnings",
        report.outcomes.len(),
        report.warnings.len()
    );

    let records = if args.dump {
        Some(dump_records(&registry, store.as_ref()).await?)
    } else {
        None
    };
    Ok(ApplyOutput {
        module_id: args.module.clone(),
        record_id: args.record.clone(),
        event_type: args.event,
        report,
        records,
    })
}

/// Loads a registry snapshot file.
pub fn load_registry(path: &Path) -> Result<Registry> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read schema {}", path.display()))?;
    Registry::from_json(&json).with_context(|| format!("Invalid schema snapshot {}", path.display()))
}

/// Opens the SQLite store at `db`, or an empty in-memory store.
pub fn open_store(db: Option<&Path>) -> Result<Arc<dyn RecordStore>> {
    match db {
        Some(path) => {
            let store = SqliteRecordStore::open(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryRecordStore::new())),
    }
}

/// Inserts every record of a JSON array file, returning how many were loaded.
pub async fn load_records(path: &Path, store: &dyn RecordStore) -> Result<usize> {
    let records: Vec<ModuleData> = read_json(path)?;
    for record in &records {
        store
            .insert(record)
            .await
            .with_context(|| format!("Failed to load record {}", record.id))?;
    }
    Ok(records.len())
}

async fn dump_records(registry: &Registry, store: &dyn RecordStore) -> Result<Vec<ModuleData>> {
    let mut records = Vec::new();
    for module in registry.list_modules().await {
        records.extend(store.list(&module.id).await?);
    }
    Ok(records)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

// ── References ───────────────────────────────────────────────────

/// A parsed `$<moduleId>-$<fieldId>` reference, named when a schema is at hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRef {
    pub module_id: ModuleId,
    pub field_id: FieldId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

pub fn build_ref(module_id: &ModuleId, field_id: &FieldId) -> String {
    build_target_ref(module_id, field_id)
}

/// Parses a reference and, given a schema, resolves it to names.
pub async fn parse_ref(raw: &str, schema: Option<&Registry>) -> Result<ParsedRef> {
    let target = TargetRef::parse(raw)?;
    let mut parsed = ParsedRef {
        module_id: target.module_id().clone(),
        field_id: target.field_id().clone(),
        module_name: None,
        field_name: None,
    };
    if let Some(registry) = schema {
        let module = registry
            .get_module(target.module_id())
            .await
            .with_context(|| format!("Reference {raw} names an unknown module"))?;
        let field = registry
            .get_field(target.module_id(), target.field_id())
            .await
            .with_context(|| format!("Reference {raw} names an unknown field of {}", module.name))?;
        parsed.module_name = Some(module.name);
        parsed.field_name = Some(field.name);
    }
    Ok(parsed)
}
