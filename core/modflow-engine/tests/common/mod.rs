//! Shared fixtures for engine tests: an Orders/Stock shop.

#![allow(dead_code)]

use modflow_engine::{EngineConfig, RecordService, RuleEvaluator, RuleOutcome, RuleStatus};
use modflow_model::{
    EventRule, Field, FieldSchema, ModuleData, Relationship, TargetBinding, build_target_ref,
};
use modflow_registry::{NewField, Registry, SchemaSource};
use modflow_storage::{MemoryRecordStore, RecordStore};
use modflow_types::{DataTypeId, EventType, ModuleId, RecordId};
use serde_json::json;
use std::sync::Arc;

pub struct Shop {
    pub registry: Arc<Registry>,
    pub store: Arc<MemoryRecordStore>,
    pub text: DataTypeId,
    pub number: DataTypeId,
    pub list: DataTypeId,
    pub orders: ModuleId,
    pub stock: ModuleId,
    pub stock_sku: Field,
    pub stock_qty: Field,
}

/// Orders { customer (label), items: [{ sku, qty }] } and Stock { sku (label), qty }.
pub async fn shop() -> Shop {
    let registry = Arc::new(Registry::new());
    let text = registry.create_data_type("Text", "string").await.unwrap().id;
    let number = registry.create_data_type("Number", "number").await.unwrap().id;
    let list = registry.create_data_type("List", "array").await.unwrap().id;

    let orders = registry.create_module("Orders").await.unwrap().id;
    let stock = registry.create_module("Stock").await.unwrap().id;

    registry
        .create_field(NewField::new(orders.clone(), "customer", text.clone()).label())
        .await
        .unwrap();
    registry
        .create_field(NewField::new(orders.clone(), "items", list.clone()).with_type_schema(vec![
            FieldSchema::new("sku", text.clone()).required(),
            FieldSchema::new("qty", number.clone()).required(),
        ]))
        .await
        .unwrap();
    let stock_sku = registry
        .create_field(NewField::new(stock.clone(), "sku", text.clone()).label())
        .await
        .unwrap();
    let stock_qty = registry
        .create_field(NewField::new(stock.clone(), "qty", number.clone()))
        .await
        .unwrap();

    Shop {
        registry,
        store: Arc::new(MemoryRecordStore::new()),
        text,
        number,
        list,
        orders,
        stock,
        stock_sku,
        stock_qty,
    }
}

impl Shop {
    pub fn qty_ref(&self) -> String {
        build_target_ref(&self.stock, &self.stock_qty.id)
    }

    pub fn service(&self, config: EngineConfig) -> RecordService {
        let store: Arc<dyn RecordStore> = self.store.clone();
        RecordService::new(Arc::clone(&self.registry), store, config)
    }

    pub fn evaluator(&self, config: EngineConfig) -> RuleEvaluator {
        let schema: Arc<dyn SchemaSource> = self.registry.clone();
        let store: Arc<dyn RecordStore> = self.store.clone();
        RuleEvaluator::new(schema, store, config)
    }

    /// Appends a relationship with the given rules to `base`.
    pub async fn relate(
        &self,
        base: &ModuleId,
        target: &ModuleId,
        binding: TargetBinding,
        rules: Vec<(EventType, EventRule)>,
    ) {
        let mut relationships = self.registry.get_module(base).await.unwrap().relationships;
        relationships.push(relationship(base, target, binding, rules));
        self.registry.set_relationships(base, relationships).await.unwrap();
    }

    /// Like [`Shop::relate`], but loads the relationship through a snapshot,
    /// the way a stored document arrives, so its rules are not checked.
    pub async fn relate_unchecked(
        &mut self,
        base: ModuleId,
        target: ModuleId,
        binding: TargetBinding,
        rules: Vec<(EventType, EventRule)>,
    ) {
        let mut snapshot = self.registry.snapshot().await;
        let module = snapshot.modules.iter_mut().find(|m| m.id == base).unwrap();
        module.relationships.push(relationship(&base, &target, binding, rules));
        self.registry = Arc::new(Registry::from_snapshot(snapshot).unwrap());
    }

    /// Stores a record directly, without running any rules.
    pub async fn seed(&self, module: &ModuleId, data: serde_json::Value) -> ModuleData {
        let record = ModuleData::new(module.clone(), data);
        self.store.insert(&record).await.unwrap();
        record
    }

    pub async fn stock_item(&self, sku: &str, qty: i64) -> ModuleData {
        self.seed(&self.stock, json!({"sku": sku, "qty": qty})).await
    }

    pub async fn field_of(&self, module: &ModuleId, id: &RecordId, field: &str) -> serde_json::Value {
        let record = self.store.get(module, id).await.unwrap().unwrap();
        record.data.get(field).cloned().unwrap_or(serde_json::Value::Null)
    }

    pub async fn qty_of(&self, id: &RecordId) -> serde_json::Value {
        self.field_of(&self.stock, id, "qty").await
    }
}

fn relationship(
    base: &ModuleId,
    target: &ModuleId,
    binding: TargetBinding,
    rules: Vec<(EventType, EventRule)>,
) -> Relationship {
    let mut relationship = Relationship::new(base.clone(), target.clone()).with_binding(binding);
    for (event, rule) in rules {
        relationship = relationship.with_rule(event, rule);
    }
    relationship
}

/// Binds order items to stock records by sku.
pub fn by_sku() -> TargetBinding {
    TargetBinding::Match {
        source_field: "item.sku".into(),
        target_field: "sku".into(),
    }
}

pub fn applied(outcome: &RuleOutcome) -> bool {
    matches!(outcome.status, RuleStatus::Applied { .. })
}
