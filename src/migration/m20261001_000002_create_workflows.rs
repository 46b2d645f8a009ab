//! Migration: Create workflows, versions, subscriptions, test suites and test instances.

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
                CREATE TABLE workflows (
                    uuid UUID PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE TABLE workflow_subscriptions (
                    workflow_uuid UUID NOT NULL REFERENCES workflows(uuid) ON DELETE CASCADE,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (workflow_uuid, user_id)
                );

                CREATE TABLE workflow_versions (
                    id UUID PRIMARY KEY,
                    workflow_uuid UUID NOT NULL REFERENCES workflows(uuid) ON DELETE CASCADE,
                    version VARCHAR(255) NOT NULL,
                    submitter_id UUID REFERENCES users(id) ON DELETE SET NULL,
                    ro_crate_uri VARCHAR(2048),
                    crate_digest VARCHAR(64),
                    github_managed BOOLEAN NOT NULL DEFAULT FALSE,
                    repository_config JSONB,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                    UNIQUE (workflow_uuid, version)
                );

                CREATE TRIGGER update_workflow_versions_updated_at
                    BEFORE UPDATE ON workflow_versions
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();

                CREATE TABLE test_suites (
                    id UUID PRIMARY KEY,
                    workflow_version_id UUID NOT NULL REFERENCES workflow_versions(id) ON DELETE CASCADE,
                    name VARCHAR(255) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_test_suites_version ON test_suites(workflow_version_id);

                CREATE TABLE test_instances (
                    id UUID PRIMARY KEY,
                    test_suite_id UUID NOT NULL REFERENCES test_suites(id) ON DELETE CASCADE,
                    name VARCHAR(255) NOT NULL,
                    resource VARCHAR(2048) NOT NULL,
                    testing_service_id UUID NOT NULL REFERENCES testing_services(id),

                    -- Most recent builds first, bounded window
                    recent_builds JSONB NOT NULL DEFAULT '[]'::jsonb,
                    last_refresh_error TEXT,
                    refreshed_at TIMESTAMPTZ,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_test_instances_suite ON test_instances(test_suite_id);

                CREATE TRIGGER update_test_instances_updated_at
                    BEFORE UPDATE ON test_instances
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
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
                DROP TRIGGER IF EXISTS update_test_instances_updated_at ON test_instances;
                DROP TABLE IF EXISTS test_instances CASCADE;
                DROP TABLE IF EXISTS test_suites CASCADE;
                DROP TRIGGER IF EXISTS update_workflow_versions_updated_at ON workflow_versions;
                DROP TABLE IF EXISTS workflow_versions CASCADE;
                DROP TABLE IF EXISTS workflow_subscriptions CASCADE;
                DROP TABLE IF EXISTS workflows CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
