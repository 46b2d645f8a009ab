//! Reconciliation scheduler: job runtime and the build jobs.

pub mod builds;
pub mod scheduler;

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Timeouts;
use crate::db::{DbPool, NotificationStore, WorkflowStore};
use crate::error::{AppError, AppResult};
use crate::models::TestInstance;
use crate::services::{
    AuthContext, BuildCache, CrateRefresher, EventBroadcaster, Metrics, RemoteCrateRefresher,
    ServiceRegistry, SubmitterSession, TestingService, TransactionScope, TransitionNotifier,
};

pub use builds::{check_last_build, check_workflows, periodic_builds};
pub use scheduler::{InvocationOutcome, JobOptions, ScheduledJob, default_jobs, start_scheduler};

/// Everything a job invocation needs, created once at start-up and passed by reference.
#[derive(Clone)]
pub struct TaskContext {
    pub workflows: Arc<dyn WorkflowStore>,
    pub registry: Arc<ServiceRegistry>,
    pub cache: Arc<BuildCache>,
    pub transactions: TransactionScope,
    pub broadcaster: EventBroadcaster,
    pub auth: Arc<dyn AuthContext>,
    pub crates: Arc<dyn CrateRefresher>,
    pub notifier: Arc<TransitionNotifier>,
    pub metrics: Arc<Metrics>,
}

impl TaskContext {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        notifications: Arc<dyn NotificationStore>,
        crates: Arc<dyn CrateRefresher>,
        broadcaster: EventBroadcaster,
        timeouts: &Timeouts,
    ) -> Self {
        let cache = Arc::new(BuildCache::new(timeouts));
        let registry = Arc::new(ServiceRegistry::new(cache.clone(), *timeouts));
        let notifier = Arc::new(TransitionNotifier::new(
            notifications,
            workflows.clone(),
            broadcaster.clone(),
        ));
        Self {
            workflows,
            registry,
            cache,
            transactions: TransactionScope::new(),
            broadcaster,
            auth: Arc::new(SubmitterSession::new()),
            crates,
            notifier,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Context backed by the database.
    pub fn with_database(pool: &DbPool, broadcaster: EventBroadcaster, timeouts: &Timeouts) -> AppResult<Self> {
        let store = Arc::new(pool.clone());
        let crates = Arc::new(RemoteCrateRefresher::new(timeouts)?);
        Ok(Self::new(store.clone(), store, crates, broadcaster, timeouts))
    }

    /// Testing service an instance runs on.
    pub async fn service_for(&self, instance: &TestInstance) -> AppResult<Arc<dyn TestingService>> {
        if let Some(service) = self.registry.get(instance.testing_service_id).await {
            return Ok(service);
        }
        let config = self
            .workflows
            .testing_service(instance.testing_service_id)
            .await?;
        self.registry.resolve(&config).await
    }
}

/// Names accepted by [`run_job`].
pub const JOB_NAMES: [&str; 3] = ["check_workflows", "check_last_build", "periodic_builds"];

/// Run one job by name, optionally restricted to some workflows.
pub async fn run_job(ctx: &TaskContext, name: &str, workflows: &[Uuid]) -> AppResult<()> {
    match name {
        "check_workflows" => check_workflows(ctx).await,
        "check_last_build" => {
            if workflows.is_empty() {
                check_last_build(ctx, None).await;
            }
            for uuid in workflows {
                check_last_build(ctx, Some(*uuid)).await;
            }
        }
        "periodic_builds" => {
            let filter = (!workflows.is_empty()).then_some(workflows);
            periodic_builds(ctx, filter).await;
        }
        other => {
            return Err(AppError::InvalidInput(format!(
                "Unknown job '{}'; expected one of {}",
                other,
                JOB_NAMES.join(", ")
            )));
        }
    }
    Ok(())
}
