//! Transition notifier.
//!
//! Compares the two most recent builds of a test instance and stores at most
//! one notification per pass/fail flip, deduplicated by notification name.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::db::{NotificationStore, WorkflowStore};
use crate::error::AppResult;
use crate::models::{
    BuildStatus, EventType, NewNotification, Notification, TestBuild, TestInstance, WorkflowVersion,
    WsEvent, WsEventMessage,
};
use crate::services::event_broadcaster::EventBroadcaster;

/// Direction of a pass/fail flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Failed,
    Recovered,
}

impl TransitionKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Failed => "FAILED",
            Self::Recovered => "RECOVERED",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Self::Failed => EventType::BuildFailed,
            Self::Recovered => EventType::BuildRecovered,
        }
    }
}

/// Transition between the two most recent builds (most recent first).
///
/// Fires only when both are terminal and their statuses differ; only the
/// two-build window is considered.
pub fn detect_transition(builds: &[TestBuild]) -> Option<TransitionKind> {
    let [last, previous, ..] = builds else {
        return None;
    };
    if !last.status.is_terminal() || !previous.status.is_terminal() || last.status == previous.status {
        return None;
    }
    Some(if last.status == BuildStatus::Failed {
        TransitionKind::Failed
    } else {
        TransitionKind::Recovered
    })
}

/// Deduplication key of a transition notification.
pub fn notification_name(build: &TestBuild, kind: TransitionKind) -> String {
    format!("{} {}", build, kind.suffix())
}

pub struct TransitionNotifier {
    notifications: Arc<dyn NotificationStore>,
    workflows: Arc<dyn WorkflowStore>,
    broadcaster: EventBroadcaster,
}

impl TransitionNotifier {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        workflows: Arc<dyn WorkflowStore>,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            notifications,
            workflows,
            broadcaster,
        }
    }

    /// Store a notification if `builds` end with a new transition.
    ///
    /// Returns the stored notification, or `None` when nothing changed or a
    /// notification with the same name already exists.
    pub async fn notify_transition(
        &self,
        version: &WorkflowVersion,
        instance: &TestInstance,
        builds: &[TestBuild],
    ) -> AppResult<Option<Notification>> {
        let Some(kind) = detect_transition(builds) else {
            return Ok(None);
        };
        let last = &builds[0];
        let name = notification_name(last, kind);

        if !self.notifications.find_by_name(&name).await?.is_empty() {
            debug!(name = %name, "Notification already sent");
            return Ok(None);
        }

        let recipients = self.workflows.subscribers(version.workflow_uuid).await?;
        let data = json!({ "build": instance.build_summary(last) });
        let created = self
            .notifications
            .create(NewNotification {
                event_type: kind.event_type(),
                name: name.clone(),
                data,
                recipients,
            })
            .await?;

        let Some(notification) = created else {
            debug!(name = %name, "Notification stored concurrently");
            return Ok(None);
        };

        info!(
            name = %notification.name,
            version = %version,
            recipients = notification.recipients.len(),
            "Transition notification created"
        );
        self.broadcaster.send(WsEventMessage::new(WsEvent::notification_created(
            notification.id,
            notification.event_type,
            &notification.name,
            notification.recipients.len(),
        )));
        Ok(Some(notification))
    }
}
