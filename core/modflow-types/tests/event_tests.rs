use modflow_types::{Error, EventType};
use std::str::FromStr;

#[test]
fn wire_names() {
    assert_eq!(EventType::OnCreate.as_str(), "onCreate");
    assert_eq!(EventType::OnUpdate.as_str(), "onUpdate");
    assert_eq!(EventType::OnDelete.as_str(), "onDelete");
}

#[test]
fn display_matches_wire_name() {
    for event in EventType::ALL {
        assert_eq!(event.to_string(), event.as_str());
    }
}

#[test]
fn serde_uses_wire_names() {
    let json = serde_json::to_string(&EventType::OnUpdate).unwrap();
    assert_eq!(json, "\"onUpdate\"");
    let parsed: EventType = serde_json::from_str("\"onDelete\"").unwrap();
    assert_eq!(parsed, EventType::OnDelete);
}

#[test]
fn from_str_accepts_short_names() {
    assert_eq!(EventType::from_str("create").unwrap(), EventType::OnCreate);
    assert_eq!(EventType::from_str("update").unwrap(), EventType::OnUpdate);
    assert_eq!(EventType::from_str("onDelete").unwrap(), EventType::OnDelete);
}

#[test]
fn from_str_rejects_unknown() {
    assert_eq!(
        EventType::from_str("onArchive"),
        Err(Error::UnknownEventType("onArchive".to_string()))
    );
}
