//! Workflow version entity.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_versions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub workflow_uuid: Uuid,
    pub version: String,
    pub submitter_id: Option<Uuid>,
    pub ro_crate_uri: Option<String>,
    pub crate_digest: Option<String>,
    pub github_managed: bool,
    /// Periodic-build settings from the repository configuration
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub repository_config: Option<JsonValue>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::workflow::Entity",
        from = "Column::WorkflowUuid",
        to = "super::workflow::Column::Uuid"
    )]
    Workflow,
    #[sea_orm(has_many = "super::test_suite::Entity")]
    TestSuites,
}

impl Related<super::workflow::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workflow.def()
    }
}

impl Related<super::test_suite::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestSuites.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
