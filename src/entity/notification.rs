//! Notification entity. `name` is unique and acts as deduplication key.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub event_type: String,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub data: JsonValue,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_notification::Entity")]
    UserNotifications,
}

impl Related<super::user_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserNotifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
