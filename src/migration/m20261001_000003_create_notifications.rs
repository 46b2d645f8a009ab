//! Migration: Create notifications and user_notifications tables.
//!
//! The unique index on `notifications.name` backs transition deduplication.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE notifications (
                    id UUID PRIMARY KEY,
                    event_type VARCHAR(50) NOT NULL
                        CHECK (event_type IN ('build_failed', 'build_recovered')),
                    name VARCHAR(512) NOT NULL,
                    -- {"build": <build summary>}
                    data JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_notifications_name ON notifications(name);

                CREATE TABLE user_notifications (
                    notification_id UUID NOT NULL REFERENCES notifications(id) ON DELETE CASCADE,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    emailed_at TIMESTAMPTZ,
                    read_at TIMESTAMPTZ,
                    PRIMARY KEY (notification_id, user_id)
                );

                CREATE INDEX idx_user_notifications_user ON user_notifications(user_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TABLE IF EXISTS user_notifications CASCADE;
                DROP TABLE IF EXISTS notifications CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
