//! Database operations for notifications.

use std::collections::HashMap;

use sea_orm::*;
use tracing::debug;
use uuid::Uuid;

use crate::entity::{notification, user_notification};
use crate::error::{AppError, AppResult};
use crate::models::{EventType, NewNotification, Notification};

/// Notifications with exactly this name.
pub async fn find_by_name(db: &DatabaseConnection, name: &str) -> AppResult<Vec<Notification>> {
    let rows = notification::Entity::find()
        .filter(notification::Column::Name.eq(name))
        .all(db)
        .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|n| n.id).collect();
    let mut recipients: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for r in user_notification::Entity::find()
        .filter(user_notification::Column::NotificationId.is_in(ids))
        .all(db)
        .await?
    {
        recipients.entry(r.notification_id).or_default().push(r.user_id);
    }

    rows.into_iter()
        .map(|m| {
            let users = recipients.remove(&m.id).unwrap_or_default();
            model_to_notification(m, users)
        })
        .collect()
}

/// Insert a notification and its recipients in one transaction.
///
/// Returns `None` when the unique name is already taken.
pub async fn create(db: &DatabaseConnection, new: NewNotification) -> AppResult<Option<Notification>> {
    let notification = new.into_notification();
    let txn = db.begin().await?;

    let model = notification::ActiveModel {
        id: Set(notification.id),
        event_type: Set(notification.event_type.as_str().to_string()),
        name: Set(notification.name.clone()),
        data: Set(notification.data.clone()),
        created_at: Set(notification.created_at),
    };

    if let Err(e) = notification::Entity::insert(model).exec(&txn).await {
        if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            debug!(name = %notification.name, "Notification already exists");
            txn.rollback().await?;
            return Ok(None);
        }
        return Err(e.into());
    }

    if !notification.recipients.is_empty() {
        let rows = notification.recipients.iter().map(|user_id| user_notification::ActiveModel {
            notification_id: Set(notification.id),
            user_id: Set(*user_id),
            emailed_at: Set(None),
            read_at: Set(None),
        });
        user_notification::Entity::insert_many(rows).exec(&txn).await?;
    }

    txn.commit().await?;
    Ok(Some(notification))
}

fn model_to_notification(m: notification::Model, recipients: Vec<Uuid>) -> AppResult<Notification> {
    let event_type = EventType::parse(&m.event_type)
        .ok_or_else(|| AppError::Database(format!("Unknown event type '{}'", m.event_type)))?;
    Ok(Notification {
        id: m.id,
        created_at: m.created_at,
        event_type,
        name: m.name,
        data: m.data,
        recipients,
    })
}
