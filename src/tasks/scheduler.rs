//! Interval scheduler for the reconciliation jobs.
//!
//! Each job gets its own ticker. Jobs on the same queue never run at the same
//! time; an invocation that waited longer than its `max_age` for its queue is
//! dropped, and a job body that panics is re-run up to `max_retries` times.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

use super::{TaskContext, builds};
use crate::config::Config;

/// Queue shared by the build jobs.
pub const BUILDS_QUEUE: &str = "builds";

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type JobFn = Arc<dyn Fn(TaskContext) -> JobFuture + Send + Sync>;

/// Retry and expiry options of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub max_retries: u32,
    pub max_age: Duration,
}

/// A recurring job.
#[derive(Clone)]
pub struct ScheduledJob {
    pub name: &'static str,
    pub queue: &'static str,
    pub interval: Duration,
    pub options: JobOptions,
    run: JobFn,
}

impl ScheduledJob {
    pub fn new<F, Fut>(
        name: &'static str,
        queue: &'static str,
        interval: Duration,
        options: JobOptions,
        run: F,
    ) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            queue,
            interval,
            options,
            run: Arc::new(move |ctx| Box::pin(run(ctx))),
        }
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .field("interval", &self.interval)
            .field("options", &self.options)
            .finish()
    }
}

/// Result of one scheduled invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed { attempts: u32 },
    Failed { attempts: u32 },
    Expired,
}

/// The three build jobs with their intervals derived from the timeouts.
pub fn default_jobs(config: &Config) -> Vec<ScheduledJob> {
    let timeouts = &config.timeouts;
    let max_age = timeouts.task_expiration;
    vec![
        ScheduledJob::new(
            "check_workflows",
            BUILDS_QUEUE,
            timeouts.workflow.mul_f64(0.75),
            JobOptions { max_retries: 3, max_age },
            |ctx| async move { builds::check_workflows(&ctx).await },
        ),
        ScheduledJob::new(
            "check_last_build",
            BUILDS_QUEUE,
            timeouts.build.mul_f64(0.75),
            JobOptions { max_retries: 3, max_age },
            |ctx| async move { builds::check_last_build(&ctx, None).await },
        ),
        ScheduledJob::new(
            "periodic_builds",
            BUILDS_QUEUE,
            timeouts.build,
            JobOptions { max_retries: 0, max_age },
            |ctx| async move { builds::periodic_builds(&ctx, None).await },
        ),
    ]
}

/// Spawn one ticker task per job.
pub fn start_scheduler(ctx: TaskContext, jobs: Vec<ScheduledJob>) -> Vec<JoinHandle<()>> {
    let mut queues: HashMap<&'static str, Arc<Mutex<()>>> = HashMap::new();
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let queue = queues.entry(job.queue).or_default().clone();
        let ctx = ctx.clone();
        info!(
            job = job.name,
            queue = job.queue,
            interval_secs = job.interval.as_secs(),
            "Scheduling job"
        );
        handles.push(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + job.interval;
            let mut ticker = interval_at(start, job.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let scheduled_at = ticker.tick().await.into_std();
                run_invocation(&ctx, &job, &queue, scheduled_at).await;
            }
        }));
    }
    handles
}

/// Run one invocation of `job` once its queue is free.
pub async fn run_invocation(
    ctx: &TaskContext,
    job: &ScheduledJob,
    queue: &Mutex<()>,
    scheduled_at: Instant,
) -> InvocationOutcome {
    let _slot = queue.lock().await;

    let age = scheduled_at.elapsed();
    if age > job.options.max_age {
        warn!(
            job = job.name,
            age_secs = age.as_secs(),
            "Invocation expired before it could run"
        );
        ctx.metrics.job_skipped_stale();
        return InvocationOutcome::Expired;
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        ctx.metrics.job_started();
        match tokio::spawn((job.run)(ctx.clone())).await {
            Ok(()) => {
                ctx.metrics.job_completed();
                return InvocationOutcome::Completed { attempts };
            }
            Err(e) if attempts <= job.options.max_retries => {
                ctx.metrics.job_retried();
                warn!(job = job.name, attempt = attempts, error = %e, "Job aborted, retrying");
            }
            Err(e) => {
                error!(job = job.name, attempts, error = %e, "Job aborted");
                return InvocationOutcome::Failed { attempts };
            }
        }
    }
}
