//! Notification model: persisted user-facing alerts about build transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BuildFailed,
    BuildRecovered,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildFailed => "build_failed",
            Self::BuildRecovered => "build_recovered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "build_failed" => Some(Self::BuildFailed),
            "build_recovered" => Some(Self::BuildRecovered),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored notification. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub event_type: EventType,
    /// Deduplication key
    pub name: String,
    /// Serialized build summary
    pub data: JsonValue,
    /// Recipient user ids
    pub recipients: Vec<Uuid>,
}

/// Notification to be stored.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub event_type: EventType,
    pub name: String,
    pub data: JsonValue,
    pub recipients: Vec<Uuid>,
}

impl NewNotification {
    /// Materialize into a stored notification.
    pub fn into_notification(self) -> Notification {
        Notification {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            event_type: self.event_type,
            name: self.name,
            data: self.data,
            recipients: self.recipients,
        }
    }
}
