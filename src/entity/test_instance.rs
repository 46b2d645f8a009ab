//! Test instance entity with its persisted recent-builds window.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "test_instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub test_suite_id: Uuid,
    pub name: String,
    pub resource: String,
    pub testing_service_id: Uuid,
    /// Serialized builds, most recent first
    #[sea_orm(column_type = "JsonBinary")]
    pub recent_builds: JsonValue,
    pub last_refresh_error: Option<String>,
    pub refreshed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::test_suite::Entity",
        from = "Column::TestSuiteId",
        to = "super::test_suite::Column::Id"
    )]
    TestSuite,
}

impl Related<super::test_suite::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestSuite.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
