//! Persistence: PostgreSQL through SeaORM behind narrow store traits.
//!
//! The scheduler and the notifier only depend on [`WorkflowStore`] and
//! [`NotificationStore`]; [`DbPool`] is the production implementation.

pub mod notifications;
pub mod workflows;

use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::migration::Migrator;
use crate::models::{NewNotification, Notification, TestInstance, Workflow, WorkflowVersion};
use crate::services::testing_service::TestingServiceConfig;

/// Workflow graph storage.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Every workflow with its versions, suites and instances.
    async fn all_workflows(&self) -> AppResult<Vec<Workflow>>;

    async fn find_workflow(&self, uuid: Uuid) -> AppResult<Option<Workflow>>;

    /// Persist the builds window and refresh state of an instance.
    async fn save_instance(&self, instance: &TestInstance) -> AppResult<()>;

    /// Persist the crate digest of a version.
    async fn save_version(&self, version: &WorkflowVersion) -> AppResult<()>;

    /// Ids of the users subscribed to a workflow.
    async fn subscribers(&self, workflow_uuid: Uuid) -> AppResult<Vec<Uuid>>;

    /// Stored configuration of a testing service.
    async fn testing_service(&self, id: Uuid) -> AppResult<TestingServiceConfig>;
}

/// Notification storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> AppResult<Vec<Notification>>;

    /// Store a notification; `None` when one with the same name already exists.
    async fn create(&self, notification: NewNotification) -> AppResult<Option<Notification>>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect to the database at `database_url`.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options.sqlx_logging(false);
        let conn = Database::connect(options).await?;
        Ok(Self { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None).await?;
        info!("Database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for DbPool {
    async fn all_workflows(&self) -> AppResult<Vec<Workflow>> {
        workflows::load_all(&self.conn).await
    }

    async fn find_workflow(&self, uuid: Uuid) -> AppResult<Option<Workflow>> {
        workflows::find_by_uuid(&self.conn, uuid).await
    }

    async fn save_instance(&self, instance: &TestInstance) -> AppResult<()> {
        workflows::save_instance(&self.conn, instance).await
    }

    async fn save_version(&self, version: &WorkflowVersion) -> AppResult<()> {
        workflows::save_version(&self.conn, version).await
    }

    async fn subscribers(&self, workflow_uuid: Uuid) -> AppResult<Vec<Uuid>> {
        workflows::subscribers(&self.conn, workflow_uuid).await
    }

    async fn testing_service(&self, id: Uuid) -> AppResult<TestingServiceConfig> {
        workflows::find_testing_service(&self.conn, id).await
    }
}

#[async_trait]
impl NotificationStore for DbPool {
    async fn find_by_name(&self, name: &str) -> AppResult<Vec<Notification>> {
        notifications::find_by_name(&self.conn, name).await
    }

    async fn create(&self, notification: NewNotification) -> AppResult<Option<Notification>> {
        notifications::create(&self.conn, notification).await
    }
}
