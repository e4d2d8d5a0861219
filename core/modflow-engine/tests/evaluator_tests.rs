mod common;

use common::{applied, by_sku, shop};
use modflow_engine::{EngineConfig, EvaluationWarning, RuleError, RuleStatus, SkipReason};
use modflow_model::{
    EventRule, ModuleData, MutationError, RefError, RuleAction, TargetBinding, build_target_ref,
};
use modflow_registry::NewField;
use modflow_storage::RecordStore;
use modflow_types::{EventType, FieldId, ModuleId};
use pretty_assertions::assert_eq;
use serde_json::json;

fn decrement_by_item_qty(target: String) -> EventRule {
    EventRule::new(RuleAction::Decrement).source("item.qty").target(target)
}

fn bump(module: &ModuleId, field: &FieldId) -> EventRule {
    EventRule::new(RuleAction::Increment).target(build_target_ref(module, field))
}

// ── Orders / Stock ───────────────────────────────────────────────

#[tokio::test]
async fn order_items_decrement_stock_per_element() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(EventType::OnCreate, decrement_by_item_qty(shop.qty_ref()))],
    )
    .await;
    let widget = shop.stock_item("A", 10).await;

    let order = shop
        .seed(&shop.orders, json!({"customer": "Ada", "items": [{"sku": "A", "qty": 3}, {"sku": "A", "qty": 2}]}))
        .await;
    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    assert_eq!(shop.qty_of(&widget.id).await, json!(5));
    assert_eq!(report.outcomes.len(), 2);
    for (index, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.status, RuleStatus::Applied { changed: true });
        assert_eq!(outcome.item_index, Some(index));
        assert_eq!(outcome.target_record, Some(widget.id.clone()));
        assert_eq!(outcome.event_type, EventType::OnCreate);
        assert_eq!(outcome.depth, 0);
    }
    assert!(report.is_clean());
}

#[tokio::test]
async fn item_sourced_increments_net_the_sum() {
    let cases: [Vec<i64>; 4] = [vec![1], vec![4, 6, 7], vec![2, 2, 2, 2, 2], vec![]];
    for quantities in cases {
        let shop = shop().await;
        shop.relate(
            &shop.orders,
            &shop.stock,
            by_sku(),
            vec![(
                EventType::OnCreate,
                EventRule::new(RuleAction::Increment).source("item.qty").target(shop.qty_ref()),
            )],
        )
        .await;
        let widget = shop.stock_item("A", 100).await;
        let items: Vec<_> = quantities.iter().map(|q| json!({"sku": "A", "qty": q})).collect();
        let order = shop.seed(&shop.orders, json!({"items": items})).await;

        shop.evaluator(EngineConfig::default())
            .on_record_created(&shop.orders, &order)
            .await;

        let expected = 100 + quantities.iter().sum::<i64>();
        assert_eq!(shop.qty_of(&widget.id).await, json!(expected), "{quantities:?}");
    }
}

#[tokio::test]
async fn empty_item_array_is_skipped() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(EventType::OnCreate, decrement_by_item_qty(shop.qty_ref()))],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({"items": []})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, RuleStatus::Skipped(SkipReason::NoItems));
}

#[tokio::test]
async fn coalesced_items_write_once_per_target() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(EventType::OnCreate, decrement_by_item_qty(shop.qty_ref()))],
    )
    .await;
    let a = shop.stock_item("A", 10).await;
    let b = shop.stock_item("B", 10).await;
    let order = shop
        .seed(
            &shop.orders,
            json!({"items": [{"sku": "A", "qty": 3}, {"sku": "B", "qty": 1}, {"sku": "A", "qty": 2}]}),
        )
        .await;

    let config = EngineConfig {
        coalesce_item_arithmetic: true,
        ..Default::default()
    };
    let report = shop.evaluator(config).on_record_created(&shop.orders, &order).await;

    assert_eq!(shop.qty_of(&a.id).await, json!(5));
    assert_eq!(shop.qty_of(&b.id).await, json!(9));
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(applied));
    assert!(report.outcomes.iter().all(|o| o.item_index.is_none()));
    assert_eq!(report.outcomes[0].target_record, Some(a.id));
    assert_eq!(report.outcomes[1].target_record, Some(b.id));
}

#[tokio::test]
async fn unmatched_item_is_skipped_without_affecting_others() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(EventType::OnCreate, decrement_by_item_qty(shop.qty_ref()))],
    )
    .await;
    let a = shop.stock_item("A", 10).await;
    let order = shop
        .seed(&shop.orders, json!({"items": [{"sku": "Z", "qty": 3}, {"sku": "A", "qty": 1}]}))
        .await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    assert_eq!(report.outcomes[0].status, RuleStatus::Skipped(SkipReason::NoTargetRecord));
    assert!(applied(&report.outcomes[1]));
    assert_eq!(shop.qty_of(&a.id).await, json!(9));
}

// ── Bindings ─────────────────────────────────────────────────────

#[tokio::test]
async fn sole_binding_needs_exactly_one_record() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnCreate, EventRule::new(RuleAction::Increment).target(shop.qty_ref()))],
    )
    .await;
    let evaluator = shop.evaluator(EngineConfig::default());
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = evaluator.on_record_created(&shop.orders, &order).await;
    assert_eq!(report.outcomes[0].status, RuleStatus::Skipped(SkipReason::NoTargetRecord));

    let only = shop.stock_item("A", 0).await;
    let report = evaluator.on_record_created(&shop.orders, &order).await;
    assert!(applied(&report.outcomes[0]));
    assert_eq!(shop.qty_of(&only.id).await, json!(1));

    shop.stock_item("B", 0).await;
    let report = evaluator.on_record_created(&shop.orders, &order).await;
    assert_eq!(report.outcomes[0].status, RuleStatus::Skipped(SkipReason::AmbiguousTarget(2)));
}

#[tokio::test]
async fn fixed_record_binding() {
    let shop = shop().await;
    let a = shop.stock_item("A", 1).await;
    let b = shop.stock_item("B", 1).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Record { record_id: b.id.clone() },
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Multiply).delta(json!(3)).target(shop.qty_ref()),
        )],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    shop.evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert_eq!(shop.qty_of(&a.id).await, json!(1));
    assert_eq!(shop.qty_of(&b.id).await, json!(3));
}

#[tokio::test]
async fn foreign_key_binding_reads_target_id_from_source() {
    let shop = shop().await;
    shop.registry
        .create_field(NewField::new(shop.orders.clone(), "stockId", shop.text.clone()))
        .await
        .unwrap();
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::ForeignKey { source_field: "stockId".into() },
        vec![(EventType::OnCreate, EventRule::new(RuleAction::Decrement).target(shop.qty_ref()))],
    )
    .await;
    let a = shop.stock_item("A", 4).await;
    let evaluator = shop.evaluator(EngineConfig::default());

    let order = shop.seed(&shop.orders, json!({"stockId": a.id.to_string()})).await;
    let report = evaluator.on_record_created(&shop.orders, &order).await;
    assert!(applied(&report.outcomes[0]));
    assert_eq!(shop.qty_of(&a.id).await, json!(3));

    let without_key = shop.seed(&shop.orders, json!({})).await;
    let report = evaluator.on_record_created(&shop.orders, &without_key).await;
    assert_eq!(
        report.outcomes[0].status,
        RuleStatus::Skipped(SkipReason::MissingSource("stockId".into()))
    );
}

#[tokio::test]
async fn source_binding_targets_the_triggering_record() {
    let shop = shop().await;
    let status = shop
        .registry
        .create_field(NewField::new(shop.orders.clone(), "status", shop.text.clone()))
        .await
        .unwrap();
    shop.relate(
        &shop.orders,
        &shop.orders,
        TargetBinding::Source,
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Set)
                .value(json!("received"))
                .target(build_target_ref(&shop.orders, &status.id)),
        )],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({"customer": "Ada"})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert!(applied(&report.outcomes[0]));
    assert_eq!(shop.field_of(&shop.orders, &order.id, "status").await, json!("received"));
}

#[tokio::test]
async fn rule_binding_overrides_relationship_binding() {
    let shop = shop().await;
    let a = shop.stock_item("A", 0).await;
    let b = shop.stock_item("B", 0).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Record { record_id: a.id.clone() },
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Increment)
                .target(shop.qty_ref())
                .binding(TargetBinding::Record { record_id: b.id.clone() }),
        )],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    shop.evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert_eq!(shop.qty_of(&a.id).await, json!(0));
    assert_eq!(shop.qty_of(&b.id).await, json!(1));
}

// ── Failure isolation ────────────────────────────────────────────

#[tokio::test]
async fn malformed_target_ref_fails_only_its_rule() {
    let mut shop = shop().await;
    let a = shop.stock_item("A", 0).await;
    shop.relate_unchecked(
        shop.orders.clone(),
        shop.stock.clone(),
        TargetBinding::Sole,
        vec![
            (EventType::OnCreate, EventRule::new(RuleAction::Increment).target("stock-qty")),
            (EventType::OnCreate, EventRule::new(RuleAction::Increment).target(shop.qty_ref())),
        ],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    assert_eq!(
        report.outcomes[0].status,
        RuleStatus::Failed(RuleError::Reference(RefError::Invalid("stock-qty".into())))
    );
    assert_eq!(report.outcomes[1].rule_index, 1);
    assert!(applied(&report.outcomes[1]));
    assert_eq!(shop.qty_of(&a.id).await, json!(1));
}

#[tokio::test]
async fn target_ref_into_another_module_fails() {
    let mut shop = shop().await;
    shop.stock_item("A", 0).await;
    let foreign = build_target_ref(&shop.orders, &shop.stock_qty.id);
    shop.relate_unchecked(
        shop.orders.clone(),
        shop.stock.clone(),
        TargetBinding::Sole,
        vec![(EventType::OnCreate, EventRule::new(RuleAction::Increment).target(foreign))],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert!(matches!(
        report.outcomes[0].status,
        RuleStatus::Failed(RuleError::TargetModuleMismatch { .. })
    ));
}

#[tokio::test]
async fn divide_by_zero_leaves_target_unchanged() {
    let shop = shop().await;
    let a = shop.stock_item("A", 8).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![
            (EventType::OnCreate, EventRule::new(RuleAction::Divide).delta(json!(0)).target(shop.qty_ref())),
            (EventType::OnCreate, EventRule::new(RuleAction::Divide).delta(json!(2)).target(shop.qty_ref())),
        ],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    assert!(matches!(
        report.outcomes[0].status,
        RuleStatus::Failed(RuleError::Mutation(MutationError::Arithmetic(_)))
    ));
    assert!(applied(&report.outcomes[1]));
    assert_eq!(shop.qty_of(&a.id).await, json!(4));
}

#[tokio::test]
async fn non_numeric_operand_is_a_type_mismatch() {
    let shop = shop().await;
    let a = shop.stock_item("A", 8).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Increment).source("customer").target(shop.qty_ref()),
        )],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({"customer": "Ada"})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert!(matches!(
        report.outcomes[0].status,
        RuleStatus::Failed(RuleError::Mutation(MutationError::TypeMismatch { .. }))
    ));
    assert_eq!(shop.qty_of(&a.id).await, json!(8));
}

#[tokio::test]
async fn arithmetic_on_a_text_field_is_a_type_mismatch() {
    let shop = shop().await;
    let unlabelled = shop.seed(&shop.stock, json!({"qty": 1})).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnCreate, bump(&shop.stock, &shop.stock_sku.id))],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    assert_eq!(
        report.outcomes[0].status,
        RuleStatus::Failed(RuleError::Mutation(MutationError::TypeMismatch {
            expected: "number".into(),
            found: "string".into(),
        }))
    );
    assert_eq!(shop.field_of(&shop.stock, &unlabelled.id, "sku").await, json!(null));
}

#[tokio::test]
async fn coalesced_arithmetic_on_a_text_field_fails_every_item() {
    let shop = shop().await;
    let unlabelled = shop.seed(&shop.stock, json!({"qty": 1})).await;
    let sku_ref = build_target_ref(&shop.stock, &shop.stock_sku.id);
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnCreate, decrement_by_item_qty(sku_ref))],
    )
    .await;
    let order = shop
        .seed(&shop.orders, json!({"items": [{"sku": "A", "qty": 2}, {"sku": "B", "qty": 1}]}))
        .await;

    let config = EngineConfig {
        coalesce_item_arithmetic: true,
        ..Default::default()
    };
    let report = shop.evaluator(config).on_record_created(&shop.orders, &order).await;

    assert_eq!(report.outcomes.len(), 2);
    let items: Vec<Option<usize>> = report.outcomes.iter().map(|o| o.item_index).collect();
    assert_eq!(items, vec![Some(0), Some(1)]);
    assert!(report.outcomes.iter().all(|o| matches!(
        o.status,
        RuleStatus::Failed(RuleError::Mutation(MutationError::TypeMismatch { .. }))
    )));
    assert_eq!(shop.field_of(&shop.stock, &unlabelled.id, "sku").await, json!(null));
}

#[tokio::test]
async fn set_value_must_fit_target_kind() {
    let shop = shop().await;
    let a = shop.stock_item("A", 8).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Set).value(json!("plenty")).target(shop.qty_ref()),
        )],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert!(report.failed().next().is_some());
    assert_eq!(shop.qty_of(&a.id).await, json!(8));
}

#[tokio::test]
async fn unknown_action_is_skipped() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnCreate, EventRule::new(RuleAction::from("archive".to_string())))],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert_eq!(
        report.outcomes[0].status,
        RuleStatus::Skipped(SkipReason::UnknownAction("archive".into()))
    );
}

// ── Dangling references ──────────────────────────────────────────

#[tokio::test]
async fn deleted_target_module_is_skipped_as_not_found() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(EventType::OnCreate, decrement_by_item_qty(shop.qty_ref()))],
    )
    .await;
    shop.registry.delete_module(&shop.stock).await.unwrap();
    assert!(shop.registry.get_field(&shop.stock, &shop.stock_qty.id).await.is_none());

    let order = shop.seed(&shop.orders, json!({"items": [{"sku": "A", "qty": 1}]})).await;
    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    assert_eq!(report.outcomes.len(), 1);
    assert!(matches!(
        &report.outcomes[0].status,
        RuleStatus::Skipped(SkipReason::NotFound(what)) if what.contains(shop.stock.as_str())
    ));
    assert!(matches!(
        report.warnings[..],
        [EvaluationWarning::DanglingTarget { relationship_index: 0, .. }]
    ));
}

#[tokio::test]
async fn deleted_target_field_is_skipped_as_not_found() {
    let shop = shop().await;
    shop.stock_item("A", 1).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnCreate, EventRule::new(RuleAction::Increment).target(shop.qty_ref()))],
    )
    .await;
    shop.registry.delete_data_type(&shop.number).await.unwrap();

    let order = shop.seed(&shop.orders, json!({})).await;
    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert!(matches!(report.outcomes[0].status, RuleStatus::Skipped(SkipReason::NotFound(_))));
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn reapplying_set_and_snapshot_changes_nothing() {
    let shop = shop().await;
    let last_order = shop
        .registry
        .create_field(NewField::new(shop.stock.clone(), "lastOrder", shop.text.clone()))
        .await
        .unwrap();
    let object = shop.registry.create_data_type("Object", "object").await.unwrap();
    let buyer = shop
        .registry
        .create_field(NewField::new(shop.stock.clone(), "buyer", object.id))
        .await
        .unwrap();
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![
            (
                EventType::OnCreate,
                EventRule::new(RuleAction::Set)
                    .source("id")
                    .target(build_target_ref(&shop.stock, &last_order.id)),
            ),
            (
                EventType::OnCreate,
                EventRule::new(RuleAction::Snapshot)
                    .fields(["customer"])
                    .target(build_target_ref(&shop.stock, &buyer.id)),
            ),
        ],
    )
    .await;
    let a = shop.stock_item("A", 1).await;
    let order = shop.seed(&shop.orders, json!({"customer": "Ada", "items": []})).await;
    let evaluator = shop.evaluator(EngineConfig::default());

    let first = evaluator.on_record_created(&shop.orders, &order).await;
    assert!(first.outcomes.iter().all(|o| o.status == RuleStatus::Applied { changed: true }));
    let after_first = shop.store.get(&shop.stock, &a.id).await.unwrap().unwrap();
    assert_eq!(after_first.data["lastOrder"], json!(order.id.to_string()));
    assert_eq!(after_first.data["buyer"], json!({"customer": "Ada"}));

    let second = evaluator.on_record_created(&shop.orders, &order).await;
    assert!(second.outcomes.iter().all(|o| o.status == RuleStatus::Applied { changed: false }));
    let after_second = shop.store.get(&shop.stock, &a.id).await.unwrap().unwrap();
    assert_eq!(after_second, after_first);
}

#[tokio::test]
async fn unchanged_update_runs_nothing() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnUpdate, EventRule::new(RuleAction::Increment).target(shop.qty_ref()))],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({"customer": "Ada"})).await;

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_updated(&shop.orders, &order, &order)
        .await;
    assert!(report.outcomes.is_empty());
}

// ── Propagation ──────────────────────────────────────────────────

#[tokio::test]
async fn two_module_cycle_terminates_with_revisit_guard() {
    let shop = shop().await;
    let a_count = shop
        .registry
        .create_field(NewField::new(shop.orders.clone(), "touches", shop.number.clone()))
        .await
        .unwrap();
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnUpdate, EventRule::new(RuleAction::Increment).target(shop.qty_ref()))],
    )
    .await;
    shop.relate(
        &shop.stock,
        &shop.orders,
        TargetBinding::Sole,
        vec![(EventType::OnUpdate, bump(&shop.orders, &a_count.id))],
    )
    .await;
    let item = shop.stock_item("A", 0).await;
    let before = shop.seed(&shop.orders, json!({"touches": 0})).await;
    let after = ModuleData {
        data: json!({"touches": 0, "customer": "Ada"}),
        ..before.clone()
    };
    shop.store.replace_data(&shop.orders, &before.id, after.data.clone()).await.unwrap();

    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_updated(&shop.orders, &before, &after)
        .await;

    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(applied));
    assert_eq!(report.outcomes[1].depth, 1);
    assert_eq!(shop.qty_of(&item.id).await, json!(1));
    assert_eq!(shop.field_of(&shop.orders, &before.id, "touches").await, json!(1));
    assert!(matches!(
        report.warnings[..],
        [EvaluationWarning::RevisitSuppressed { event_type: EventType::OnUpdate, .. }]
    ));
}

#[tokio::test]
async fn depth_bound_stops_long_chains() {
    let shop = shop().await;
    let registry = &shop.registry;
    let mut chain = Vec::new();
    for name in ["B", "C", "D"] {
        let module = registry.create_module(name).await.unwrap().id;
        let count = registry
            .create_field(NewField::new(module.clone(), "count", shop.number.clone()))
            .await
            .unwrap();
        let record = shop.seed(&module, json!({"count": 0})).await;
        chain.push((module, count, record));
    }
    let (b, c, d) = (&chain[0], &chain[1], &chain[2]);
    shop.relate(&shop.orders, &b.0, TargetBinding::Sole, vec![(EventType::OnCreate, bump(&b.0, &b.1.id))])
        .await;
    shop.relate(&b.0, &c.0, TargetBinding::Sole, vec![(EventType::OnUpdate, bump(&c.0, &c.1.id))])
        .await;
    shop.relate(&c.0, &d.0, TargetBinding::Sole, vec![(EventType::OnUpdate, bump(&d.0, &d.1.id))])
        .await;

    let order = shop.seed(&shop.orders, json!({})).await;
    let config = EngineConfig {
        max_depth: Some(1),
        ..Default::default()
    };
    let report = shop.evaluator(config).on_record_created(&shop.orders, &order).await;

    assert_eq!(shop.field_of(&b.0, &b.2.id, "count").await, json!(1));
    assert_eq!(shop.field_of(&c.0, &c.2.id, "count").await, json!(1));
    assert_eq!(shop.field_of(&d.0, &d.2.id, "count").await, json!(0));
    assert!(matches!(
        &report.warnings[..],
        [EvaluationWarning::CycleLimitExceeded { depth: 2, module_id, .. }] if module_id == &c.0
    ));

    let unbounded = shop.evaluator(EngineConfig::default());
    let order = shop.seed(&shop.orders, json!({})).await;
    let report = unbounded.on_record_created(&shop.orders, &order).await;
    assert!(report.is_clean());
    assert_eq!(shop.field_of(&d.0, &d.2.id, "count").await, json!(1));
}

#[tokio::test]
async fn cascade_delete_propagates_on_delete() {
    let shop = shop().await;
    let lines = shop.registry.create_module("Lines").await.unwrap().id;
    shop.registry
        .create_field(NewField::new(lines.clone(), "orderId", shop.text.clone()))
        .await
        .unwrap();
    shop.registry
        .create_field(NewField::new(lines.clone(), "sku", shop.text.clone()))
        .await
        .unwrap();
    shop.registry
        .create_field(NewField::new(lines.clone(), "qty", shop.number.clone()))
        .await
        .unwrap();
    shop.relate(
        &shop.orders,
        &lines,
        TargetBinding::Match {
            source_field: "id".into(),
            target_field: "orderId".into(),
        },
        vec![(EventType::OnDelete, EventRule::new(RuleAction::CascadeDelete))],
    )
    .await;
    shop.relate(
        &lines,
        &shop.stock,
        TargetBinding::Match {
            source_field: "sku".into(),
            target_field: "sku".into(),
        },
        vec![(
            EventType::OnDelete,
            EventRule::new(RuleAction::Increment).source("qty").target(shop.qty_ref()),
        )],
    )
    .await;

    let a = shop.stock_item("A", 5).await;
    let order = shop.seed(&shop.orders, json!({"customer": "Ada"})).await;
    let other = shop.seed(&shop.orders, json!({"customer": "Bob"})).await;
    let oid = order.id.to_string();
    shop.seed(&lines, json!({"orderId": oid, "sku": "A", "qty": 2})).await;
    shop.seed(&lines, json!({"orderId": oid, "sku": "A", "qty": 3})).await;
    shop.seed(&lines, json!({"orderId": other.id.to_string(), "sku": "A", "qty": 9})).await;

    shop.store.delete(&shop.orders, &order.id).await.unwrap();
    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_deleted(&shop.orders, &order)
        .await;

    assert_eq!(shop.store.count(&lines).await.unwrap(), 1);
    assert_eq!(shop.qty_of(&a.id).await, json!(10));
    let cascades: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.action == RuleAction::CascadeDelete)
        .collect();
    assert_eq!(cascades.len(), 2);
    assert!(cascades.iter().all(|o| applied(o)));
    assert_eq!(report.outcomes.len(), 4);
    assert!(report.is_clean());
}

// ── Validate ─────────────────────────────────────────────────────

#[tokio::test]
async fn precheck_compares_source_with_target() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Validate)
                .source("item.qty")
                .value(json!("lte"))
                .target(shop.qty_ref()),
        )],
    )
    .await;
    shop.stock_item("A", 4).await;
    let evaluator = shop.evaluator(EngineConfig::default());

    let fits = ModuleData::new(shop.orders.clone(), json!({"items": [{"sku": "A", "qty": 4}]}));
    let outcomes = evaluator.precheck(&shop.orders, EventType::OnCreate, &fits).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, RuleStatus::Applied { changed: false });

    let too_many = ModuleData::new(shop.orders.clone(), json!({"items": [{"sku": "A", "qty": 5}]}));
    let outcomes = evaluator.precheck(&shop.orders, EventType::OnCreate, &too_many).await;
    assert!(matches!(outcomes[0].status, RuleStatus::Failed(RuleError::CheckFailed(_))));
}

#[tokio::test]
async fn precheck_ignores_mutating_rules() {
    let shop = shop().await;
    let a = shop.stock_item("A", 4).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        by_sku(),
        vec![(EventType::OnCreate, decrement_by_item_qty(shop.qty_ref()))],
    )
    .await;
    let candidate = ModuleData::new(shop.orders.clone(), json!({"items": [{"sku": "A", "qty": 1}]}));

    let outcomes = shop
        .evaluator(EngineConfig::default())
        .precheck(&shop.orders, EventType::OnCreate, &candidate)
        .await;
    assert!(outcomes.is_empty());
    assert_eq!(shop.qty_of(&a.id).await, json!(4));
}

#[tokio::test]
async fn invalid_operator_fails_the_rule() {
    let shop = shop().await;
    shop.stock_item("A", 4).await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(
            EventType::OnCreate,
            EventRule::new(RuleAction::Validate)
                .delta(json!(1))
                .value(json!("about"))
                .target(shop.qty_ref()),
        )],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;
    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;
    assert_eq!(
        report.outcomes[0].status,
        RuleStatus::Failed(RuleError::InvalidOperator("about".into()))
    );
}

// ── Reports ──────────────────────────────────────────────────────

#[tokio::test]
async fn report_serializes_for_callers() {
    let shop = shop().await;
    shop.relate(
        &shop.orders,
        &shop.stock,
        TargetBinding::Sole,
        vec![(EventType::OnCreate, EventRule::new(RuleAction::Increment).target(shop.qty_ref()))],
    )
    .await;
    let order = shop.seed(&shop.orders, json!({})).await;
    let report = shop
        .evaluator(EngineConfig::default())
        .on_record_created(&shop.orders, &order)
        .await;

    let json = serde_json::to_value(&report).unwrap();
    let outcome = &json["outcomes"][0];
    assert_eq!(outcome["status"], json!("skipped"));
    assert_eq!(outcome["reason"], json!("no target record"));
    assert_eq!(outcome["eventType"], json!("onCreate"));
    assert_eq!(outcome["relationshipIndex"], json!(0));
    assert_eq!(outcome["ruleIndex"], json!(0));
    assert_eq!(outcome["action"], json!("increment"));
}
