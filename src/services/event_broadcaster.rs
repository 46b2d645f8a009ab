//! Event broadcaster for live-client updates.
//!
//! Uses tokio::sync::broadcast to fan-out events to all connected WebSocket clients.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{WorkflowVersion, WsEvent, WsEventMessage};

/// Default capacity for the broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Update type sent after cached build data was refreshed.
pub const UPDATE_SYNC: &str = "sync";

/// Distributes events to all connected WebSocket clients.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<WsEventMessage>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WsEventMessage> {
        self.sender.subscribe()
    }

    /// Broadcast an event. Returns the number of receivers; 0 without subscribers.
    pub fn send(&self, event: WsEventMessage) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// One `workflow_version_updated` event per version, carrying its current status.
    pub fn notify_workflow_version_updates<'a>(
        &self,
        versions: impl IntoIterator<Item = &'a WorkflowVersion>,
        update_type: &str,
    ) -> usize {
        let mut sent = 0;
        for version in versions {
            let status = version.status().aggregated_status;
            let event = WsEvent::workflow_version_updated(
                version.workflow_uuid,
                &version.version,
                update_type,
                Some(status),
            );
            self.send(WsEventMessage::new(event));
            sent += 1;
        }
        debug!(versions = sent, update_type, "Workflow version updates broadcast");
        sent
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
