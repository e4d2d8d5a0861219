use modflow_model::{DataKind, Field, ModuleData};
use modflow_types::{DataTypeId, FieldId, ModuleId, RecordId};
use serde_json::json;

fn make_record(data: serde_json::Value) -> ModuleData {
    ModuleData {
        id: RecordId::parse("rec-1").unwrap(),
        module_id: ModuleId::parse("Products").unwrap(),
        data,
        created_at: 1000,
        updated_at: 2000,
    }
}

fn label_field(name: &str) -> Field {
    Field {
        id: FieldId::new(),
        name: name.to_string(),
        module_id: ModuleId::parse("Products").unwrap(),
        data_type_id: DataTypeId::new(),
        is_label: true,
        type_schema: None,
        created_at: 0,
        updated_at: 0,
    }
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_record_has_matching_timestamps() {
    let r = ModuleData::new(ModuleId::new(), json!({"a": 1}));
    assert_eq!(r.created_at, r.updated_at);
    assert!(r.created_at > 0);
}

#[test]
fn serializes_camel_case() {
    let r = make_record(json!({}));
    let json = serde_json::to_value(&r).unwrap();
    assert_eq!(json["moduleId"], "Products");
    assert_eq!(json["createdAt"], 1000);
    assert_eq!(json["updatedAt"], 2000);
}

// ── Accessors ────────────────────────────────────────────────────

#[test]
fn get_reads_top_level_field() {
    let r = make_record(json!({"name": "Widget"}));
    assert_eq!(r.get("name"), Some(&json!("Widget")));
    assert_eq!(r.get("missing"), None);
}

// ── Labels ───────────────────────────────────────────────────────

#[test]
fn label_uses_label_field_value() {
    let r = make_record(json!({"title": "Blue Widget"}));
    let field = label_field("title");
    assert_eq!(r.label(Some(&field), Some(DataKind::String)), "Blue Widget");
}

#[test]
fn label_formats_numbers_without_fraction() {
    let r = make_record(json!({"code": 42}));
    let field = label_field("code");
    assert_eq!(r.label(Some(&field), Some(DataKind::Number)), "42");
}

#[test]
fn label_falls_back_to_id() {
    let r = make_record(json!({"title": "  "}));
    let field = label_field("title");
    assert_eq!(r.label(Some(&field), Some(DataKind::String)), "rec-1");
    assert_eq!(r.label(None, None), "rec-1");
}
