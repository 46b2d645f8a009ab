//! Live-update event types pushed to connected WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::EventType;
use super::workflow_status::AggregateTestStatus;

/// Event sent to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum WsEvent {
    /// Cached data of a workflow version changed.
    WorkflowVersionUpdated(WorkflowVersionUpdatedPayload),
    /// A transition notification was stored.
    NotificationCreated(NotificationCreatedPayload),
}

/// Payload for workflow_version_updated events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersionUpdatedPayload {
    pub workflow_uuid: Uuid,
    pub version: String,
    /// Kind of update, e.g. `sync`
    pub update_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_status: Option<AggregateTestStatus>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for notification_created events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationCreatedPayload {
    pub notification_id: Uuid,
    pub event_type: EventType,
    pub name: String,
    pub recipients: usize,
}

/// Wrapper that includes timestamp with every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEventMessage {
    #[serde(flatten)]
    pub event: WsEvent,
    pub timestamp: DateTime<Utc>,
}

impl WsEventMessage {
    /// Create a new event message with the current timestamp.
    pub fn new(event: WsEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

impl WsEvent {
    pub fn workflow_version_updated(
        workflow_uuid: Uuid,
        version: &str,
        update_type: &str,
        aggregated_status: Option<AggregateTestStatus>,
    ) -> Self {
        WsEvent::WorkflowVersionUpdated(WorkflowVersionUpdatedPayload {
            workflow_uuid,
            version: version.to_string(),
            update_type: update_type.to_string(),
            aggregated_status,
            updated_at: Utc::now(),
        })
    }

    pub fn notification_created(
        notification_id: Uuid,
        event_type: EventType,
        name: &str,
        recipients: usize,
    ) -> Self {
        WsEvent::NotificationCreated(NotificationCreatedPayload {
            notification_id,
            event_type,
            name: name.to_string(),
            recipients,
        })
    }
}
