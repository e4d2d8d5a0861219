//! Record lifecycle event types.
//!
//! Every write to the record store raises exactly one of these events for
//! the record's owning module. Relationships key their rule lists by the
//! same names (`onCreate`, `onUpdate`, `onDelete`).

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of lifecycle event raised by a record write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// A record was created.
    #[serde(rename = "onCreate")]
    OnCreate,
    /// A record's data was replaced or one of its fields mutated.
    #[serde(rename = "onUpdate")]
    OnUpdate,
    /// A record was deleted.
    #[serde(rename = "onDelete")]
    OnDelete,
}

impl EventType {
    /// All event types in evaluation order.
    pub const ALL: [EventType; 3] = [EventType::OnCreate, EventType::OnUpdate, EventType::OnDelete];

    /// Returns the wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::OnCreate => "onCreate",
            EventType::OnUpdate => "onUpdate",
            EventType::OnDelete => "onDelete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onCreate" | "create" => Ok(EventType::OnCreate),
            "onUpdate" | "update" => Ok(EventType::OnUpdate),
            "onDelete" | "delete" => Ok(EventType::OnDelete),
            other => Err(Error::UnknownEventType(other.to_string())),
        }
    }
}
