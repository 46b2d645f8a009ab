//! Build reconciliation jobs.
//!
//! Every job catches failures per unit of work (workflow, version or
//! instance), logs them and moves on; a job always runs to completion.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::TaskContext;
use crate::error::{AppError, AppResult};
use crate::models::{PeriodicBuildPolicy, TestBuild, TestInstance, Workflow, WorkflowVersion};
use crate::services::event_broadcaster::UPDATE_SYNC;
use crate::services::session::login_scope;
use crate::services::testing_service::DEFAULT_BUILDS_LIMIT;

fn version_key(version: &WorkflowVersion) -> String {
    format!("workflow_version:{}", version)
}

fn instance_key(instance: &TestInstance) -> String {
    format!("test_instance:{}", instance.id)
}

fn build_key(build: &TestBuild) -> String {
    format!("test_build:{}:{}", build.test_instance_id, build.build_number)
}

async fn purge_cache(ctx: &TaskContext) {
    let purged = ctx.cache.purge_expired().await;
    if purged > 0 {
        debug!(purged, "Expired cache entries dropped");
    }
}

fn log_unit_failure(ctx: &TaskContext, what: &str, e: &AppError) {
    error!("Error when {}: {}", what, e);
    debug!("{:?}", e);
    ctx.metrics.unit_failed();
}

/// All workflows, or only the listed ones. Unknown ids are logged and skipped.
async fn load_workflows(ctx: &TaskContext, filter: Option<&[Uuid]>) -> AppResult<Vec<Workflow>> {
    let Some(ids) = filter else {
        return ctx.workflows.all_workflows().await;
    };
    let mut workflows = Vec::with_capacity(ids.len());
    for id in ids {
        match ctx.workflows.find_workflow(*id).await {
            Ok(Some(w)) => workflows.push(w),
            Ok(None) => warn!(workflow = %id, "Workflow not found"),
            Err(e) => log_unit_failure(ctx, &format!("loading workflow {}", id), &e),
        }
    }
    Ok(workflows)
}

/// Refresh the crate metadata of every workflow version.
pub async fn check_workflows(ctx: &TaskContext) {
    info!("Starting 'check_workflows' task...");
    let workflows = match load_workflows(ctx, None).await {
        Ok(w) => w,
        Err(e) => {
            log_unit_failure(ctx, "loading workflows for 'check_workflows'", &e);
            info!("Task 'check_workflows': DONE");
            return;
        }
    };

    for workflow in workflows {
        for mut version in workflow.versions {
            let _tx = ctx.transactions.transaction(version_key(&version)).await;
            if let Err(e) = refresh_crate(ctx, &mut version).await {
                log_unit_failure(ctx, &format!("updating the workflow {}", workflow.uuid), &e);
            }
        }
    }
    info!("Task 'check_workflows': DONE");
}

async fn refresh_crate(ctx: &TaskContext, version: &mut WorkflowVersion) -> AppResult<()> {
    let _session = login_scope(ctx.auth.as_ref(), version.submitter.as_ref())?;
    info!(version = %version, "Updating RO-Crate...");
    let digest = ctx.crates.refresh(version, ctx.auth.as_ref()).await?;
    ctx.metrics.crate_refreshed();

    if version.crate_digest.as_deref() != Some(digest.as_str()) {
        debug!(version = %version, digest = %digest, "RO-Crate changed");
        version.crate_digest = Some(digest);
        ctx.workflows.save_version(version).await?;
    }
    info!(version = %version, "Updating RO-Crate... DONE");
    Ok(())
}

/// Poll the latest builds of every test instance and notify on transitions.
///
/// Versions whose builds are pushed by an external CI integration are skipped.
pub async fn check_last_build(ctx: &TaskContext, workflow: Option<Uuid>) {
    info!("Starting 'check_last_build' task...");
    let filter = workflow.map(|id| vec![id]);
    let workflows = match load_workflows(ctx, filter.as_deref()).await {
        Ok(w) => w,
        Err(e) => {
            log_unit_failure(ctx, "loading workflows for 'check_last_build'", &e);
            info!("Task 'check_last_build': DONE");
            return;
        }
    };

    for workflow in workflows {
        debug!(
            workflow = %workflow.uuid,
            name = %workflow.name,
            latest = ?workflow.latest_version().map(|v| v.version.as_str()),
            "Processing workflow"
        );
        for mut version in workflow.versions {
            if version.github_managed {
                warn!(version = %version, "Workflow version skipped because updated via CI app");
                continue;
            }
            check_version_builds(ctx, &mut version).await;

            if let Err(e) = ctx.workflows.save_version(&version).await {
                log_unit_failure(ctx, &format!("saving workflow version {}", version), &e);
            }
            ctx.broadcaster
                .notify_workflow_version_updates([&version], UPDATE_SYNC);
        }
    }
    purge_cache(ctx).await;
    info!("Task 'check_last_build': DONE");
}

async fn check_version_builds(ctx: &TaskContext, version: &mut WorkflowVersion) {
    for suite in 0..version.test_suites.len() {
        for idx in 0..version.test_suites[suite].test_instances.len() {
            if let Err(e) = check_instance_builds(ctx, version, suite, idx).await {
                let instance = &version.test_suites[suite].test_instances[idx];
                log_unit_failure(ctx, &format!("checking last build of {}", instance), &e);
            }
        }
    }
}

async fn check_instance_builds(
    ctx: &TaskContext,
    version: &mut WorkflowVersion,
    suite: usize,
    idx: usize,
) -> AppResult<()> {
    let instance = &mut version.test_suites[suite].test_instances[idx];
    let _tx = ctx.transactions.transaction(instance_key(instance)).await;

    ctx.cache.invalidate_instance(instance.id).await;
    let fetched = match ctx.service_for(instance).await {
        Ok(service) => service.get_test_builds(instance, DEFAULT_BUILDS_LIMIT).await,
        Err(e) => Err(e),
    };

    match fetched {
        Ok(builds) => {
            info!(instance = %instance.id, builds = builds.len(), "Updating latest builds");
            instance.record_builds(builds);
            ctx.workflows.save_instance(instance).await?;
            ctx.metrics.instance_polled();
        }
        Err(e) => {
            let detail = if e.is_testing_service() {
                e.detail().to_string()
            } else {
                e.to_string()
            };
            instance.record_refresh_error(detail);
            ctx.workflows.save_instance(instance).await?;
            return Err(e);
        }
    }

    let instance = &version.test_suites[suite].test_instances[idx];
    debug!(instance = %instance.id, last_build = ?instance.last_test_build().map(|b| b.status), "Latest build");
    if ctx
        .notifier
        .notify_transition(version, instance, &instance.recent_builds)
        .await?
        .is_some()
    {
        ctx.metrics.notification_created();
    }
    Ok(())
}

/// Trigger a new build on every instance whose last build is older than
/// the version's periodic-build interval.
///
/// All versions that triggered at least one build are announced in one
/// broadcast at the end.
pub async fn periodic_builds(ctx: &TaskContext, workflows: Option<&[Uuid]>) {
    info!("Task 'periodic_builds': STARTED");
    let workflows = match load_workflows(ctx, workflows).await {
        Ok(w) => w,
        Err(e) => {
            log_unit_failure(ctx, "loading workflows for 'periodic_builds'", &e);
            info!("Task 'periodic_builds': DONE");
            return;
        }
    };

    let mut updated: Vec<WorkflowVersion> = Vec::new();
    for workflow in workflows {
        for version in workflow.versions {
            let (policy, source) = version.periodic_build_policy();
            debug!(version = %version, ?policy, ?source, "Periodic build policy");

            let mut triggered = false;
            for instance in version.test_instances() {
                match trigger_if_due(ctx, &version, instance, &policy).await {
                    Ok(started) => triggered |= started,
                    Err(e) => log_unit_failure(
                        ctx,
                        &format!("starting periodic build on {}", instance),
                        &e,
                    ),
                }
            }
            if triggered {
                updated.push(version);
            }
        }
    }

    ctx.broadcaster
        .notify_workflow_version_updates(updated.iter(), UPDATE_SYNC);
    purge_cache(ctx).await;
    info!(versions = updated.len(), "Task 'periodic_builds': DONE");
}

async fn trigger_if_due(
    ctx: &TaskContext,
    version: &WorkflowVersion,
    instance: &TestInstance,
    policy: &PeriodicBuildPolicy,
) -> AppResult<bool> {
    let last_build = {
        let _tx = ctx.transactions.transaction(instance_key(instance)).await;
        instance.last_test_build().cloned()
    };
    let Some(last_build) = last_build else {
        warn!(instance = %instance.id, "No build to rerun");
        return Ok(false);
    };

    if !policy.enabled {
        info!(
            instance = %instance.id,
            version = %version,
            "Skipping periodic build (periodic builds disabled)"
        );
        return Ok(false);
    }

    let interval = chrono::Duration::from_std(policy.interval)
        .map_err(|e| AppError::InvalidInput(format!("Periodic builds interval out of range: {}", e)))?;
    let elapsed = Utc::now() - last_build.timestamp;
    if elapsed <= interval {
        info!(
            instance = %instance.id,
            version = %version,
            elapsed_secs = elapsed.num_seconds(),
            "Skipping periodic build (interval not elapsed)"
        );
        return Ok(false);
    }

    let _tx = ctx.transactions.transaction(build_key(&last_build)).await;
    warn!(
        instance = %instance.id,
        version = %version,
        elapsed_secs = elapsed.num_seconds(),
        "Triggering periodic build"
    );
    let service = ctx.service_for(instance).await?;
    let started = service.start_test_build(instance).await?;
    if started {
        ctx.metrics.periodic_build_triggered();
    }
    Ok(started)
}
