//! Database operations for workflows and their test graph.

use std::collections::HashMap;

use sea_orm::*;
use secrecy::SecretString;
use tracing::warn;
use uuid::Uuid;

use crate::entity::{
    test_instance, test_suite, testing_service, user, workflow, workflow_subscription,
    workflow_version,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    PeriodicBuildSettings, TestBuild, TestInstance, TestSuite, User, Workflow, WorkflowVersion,
};
use crate::services::testing_service::TestingServiceConfig;

/// Load every workflow.
pub async fn load_all(db: &DatabaseConnection) -> AppResult<Vec<Workflow>> {
    let rows = workflow::Entity::find()
        .order_by_asc(workflow::Column::CreatedAt)
        .all(db)
        .await?;
    assemble(db, rows).await
}

/// Find a workflow by UUID.
pub async fn find_by_uuid(db: &DatabaseConnection, uuid: Uuid) -> AppResult<Option<Workflow>> {
    let Some(row) = workflow::Entity::find_by_id(uuid).one(db).await? else {
        return Ok(None);
    };
    Ok(assemble(db, vec![row]).await?.into_iter().next())
}

/// Build the domain graph for `rows` with one query per table.
async fn assemble(db: &DatabaseConnection, rows: Vec<workflow::Model>) -> AppResult<Vec<Workflow>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let workflow_ids: Vec<Uuid> = rows.iter().map(|w| w.uuid).collect();

    let versions = workflow_version::Entity::find()
        .filter(workflow_version::Column::WorkflowUuid.is_in(workflow_ids))
        .order_by_asc(workflow_version::Column::CreatedAt)
        .all(db)
        .await?;
    let version_ids: Vec<Uuid> = versions.iter().map(|v| v.id).collect();

    let suites = test_suite::Entity::find()
        .filter(test_suite::Column::WorkflowVersionId.is_in(version_ids))
        .order_by_asc(test_suite::Column::CreatedAt)
        .all(db)
        .await?;
    let suite_ids: Vec<Uuid> = suites.iter().map(|s| s.id).collect();

    let instances = test_instance::Entity::find()
        .filter(test_instance::Column::TestSuiteId.is_in(suite_ids))
        .order_by_asc(test_instance::Column::CreatedAt)
        .all(db)
        .await?;

    let submitter_ids: Vec<Uuid> = versions.iter().filter_map(|v| v.submitter_id).collect();
    let users: HashMap<Uuid, User> = if submitter_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(submitter_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, model_to_user(m)))
            .collect()
    };

    let mut instances_by_suite: HashMap<Uuid, Vec<TestInstance>> = HashMap::new();
    for m in instances {
        let instance = model_to_instance(m)?;
        instances_by_suite
            .entry(instance.test_suite_id)
            .or_default()
            .push(instance);
    }

    let mut suites_by_version: HashMap<Uuid, Vec<TestSuite>> = HashMap::new();
    for m in suites {
        let mut suite = TestSuite::new(m.workflow_version_id, m.name);
        suite.id = m.id;
        for instance in instances_by_suite.remove(&m.id).unwrap_or_default() {
            suite.add_instance(instance);
        }
        suites_by_version
            .entry(suite.workflow_version_id)
            .or_default()
            .push(suite);
    }

    let mut versions_by_workflow: HashMap<Uuid, Vec<WorkflowVersion>> = HashMap::new();
    for m in versions {
        let repository_config = parse_settings(
            m.repository_config,
            &format!("repository config of workflow version {}", m.id),
        );
        let version = WorkflowVersion {
            id: m.id,
            workflow_uuid: m.workflow_uuid,
            version: m.version,
            submitter: m.submitter_id.and_then(|id| users.get(&id).cloned()),
            ro_crate_uri: m.ro_crate_uri,
            crate_digest: m.crate_digest,
            github_managed: m.github_managed,
            repository_config,
            test_suites: suites_by_version.remove(&m.id).unwrap_or_default(),
            updated_at: m.updated_at,
        };
        versions_by_workflow
            .entry(version.workflow_uuid)
            .or_default()
            .push(version);
    }

    Ok(rows
        .into_iter()
        .map(|m| Workflow {
            versions: versions_by_workflow.remove(&m.uuid).unwrap_or_default(),
            uuid: m.uuid,
            name: m.name,
        })
        .collect())
}

/// Persist the recent builds and refresh state of a test instance.
pub async fn save_instance(db: &DatabaseConnection, instance: &TestInstance) -> AppResult<()> {
    let model = test_instance::Entity::find_by_id(instance.id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test instance {}", instance.id)))?;

    let recent_builds = serde_json::to_value(&instance.recent_builds)
        .map_err(|e| AppError::Database(format!("Failed to serialize builds: {}", e)))?;

    let mut active: test_instance::ActiveModel = model.into();
    active.recent_builds = Set(recent_builds);
    active.last_refresh_error = Set(instance.last_refresh_error.clone());
    active.refreshed_at = Set(instance.refreshed_at);
    active.update(db).await?;
    Ok(())
}

/// Persist the crate digest of a workflow version.
pub async fn save_version(db: &DatabaseConnection, version: &WorkflowVersion) -> AppResult<()> {
    let model = workflow_version::Entity::find_by_id(version.id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Workflow version {}", version)))?;

    version_update(model, version).update(db).await?;
    Ok(())
}

/// Only the fields the jobs change; stored configuration is left untouched.
fn version_update(
    model: workflow_version::Model,
    version: &WorkflowVersion,
) -> workflow_version::ActiveModel {
    let mut active: workflow_version::ActiveModel = model.into();
    active.crate_digest = Set(version.crate_digest.clone());
    active.updated_at = Set(chrono::Utc::now());
    active
}

/// User ids subscribed to a workflow.
pub async fn subscribers(db: &DatabaseConnection, workflow_uuid: Uuid) -> AppResult<Vec<Uuid>> {
    let rows = workflow_subscription::Entity::find()
        .filter(workflow_subscription::Column::WorkflowUuid.eq(workflow_uuid))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.user_id).collect())
}

/// Stored configuration of a testing service.
pub async fn find_testing_service(db: &DatabaseConnection, id: Uuid) -> AppResult<TestingServiceConfig> {
    let m = testing_service::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Testing service {}", id)))?;

    Ok(TestingServiceConfig {
        id: m.id,
        service_type: m.service_type,
        url: m.url,
        username: m.username,
        token: m.token.map(SecretString::from),
    })
}

fn model_to_user(m: user::Model) -> User {
    User {
        id: m.id,
        username: m.username,
        email: m.email,
        api_token: m.api_token.map(SecretString::from),
        settings: parse_settings(m.settings, &format!("settings of user {}", m.id)),
    }
}

/// Stored periodic-build settings. Unreadable JSON is logged and treated as absent.
fn parse_settings(json: Option<serde_json::Value>, what: &str) -> Option<PeriodicBuildSettings> {
    match serde_json::from_value::<PeriodicBuildSettings>(json?) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable {}", what);
            None
        }
    }
}

fn model_to_instance(m: test_instance::Model) -> AppResult<TestInstance> {
    let recent_builds: Vec<TestBuild> = serde_json::from_value(m.recent_builds).map_err(|e| {
        AppError::Database(format!("Corrupt recent builds of test instance {}: {}", m.id, e))
    })?;
    Ok(TestInstance {
        id: m.id,
        test_suite_id: m.test_suite_id,
        name: m.name,
        resource: m.resource,
        testing_service_id: m.testing_service_id,
        recent_builds,
        last_refresh_error: m.last_refresh_error,
        refreshed_at: m.refreshed_at,
    })
}
