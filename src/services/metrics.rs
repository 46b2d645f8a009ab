//! Prometheus job and pipeline metrics, passed explicitly through the task context.
//!
//! The recorder is never installed globally; every handle is registered
//! against this instance's own recorder.

use metrics::{Counter, Gauge, counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::build_cache::CacheStats;

const JOBS_STARTED: &str = "monitor_jobs_started_total";
const JOBS_COMPLETED: &str = "monitor_jobs_completed_total";
const JOBS_RETRIED: &str = "monitor_jobs_retried_total";
const JOBS_SKIPPED_STALE: &str = "monitor_jobs_skipped_stale_total";
const UNIT_FAILURES: &str = "monitor_unit_failures_total";
const INSTANCES_POLLED: &str = "monitor_instances_polled_total";
const NOTIFICATIONS_CREATED: &str = "monitor_notifications_created_total";
const PERIODIC_BUILDS_TRIGGERED: &str = "monitor_periodic_builds_triggered_total";
const CRATES_REFRESHED: &str = "monitor_crates_refreshed_total";
const CACHE_HITS: &str = "monitor_cache_hits_total";
const CACHE_MISSES: &str = "monitor_cache_misses_total";
const ACTIVE_TRANSACTIONS: &str = "monitor_active_transactions";

pub struct Metrics {
    handle: PrometheusHandle,
    jobs_started: Counter,
    jobs_completed: Counter,
    jobs_retried: Counter,
    jobs_skipped_stale: Counter,
    unit_failures: Counter,
    instances_polled: Counter,
    notifications_created: Counter,
    periodic_builds_triggered: Counter,
    crates_refreshed: Counter,
    cache_hits: Counter,
    cache_misses: Counter,
    active_transactions: Gauge,
}

/// Point-in-time counter values read back from the rendered exposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_skipped_stale: u64,
    pub unit_failures: u64,
    pub instances_polled: u64,
    pub notifications_created: u64,
    pub periodic_builds_triggered: u64,
    pub crates_refreshed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(JOBS_STARTED, "Job invocations that started running");
            describe_counter!(JOBS_COMPLETED, "Job invocations that finished");
            describe_counter!(JOBS_RETRIED, "Job attempts that failed and were retried");
            describe_counter!(JOBS_SKIPPED_STALE, "Invocations dropped for exceeding max age");
            describe_counter!(UNIT_FAILURES, "Workflows, versions or instances that failed inside a job");
            describe_counter!(INSTANCES_POLLED, "Test instances whose latest build was fetched");
            describe_counter!(NOTIFICATIONS_CREATED, "Transition notifications stored");
            describe_counter!(PERIODIC_BUILDS_TRIGGERED, "Builds started by the periodic policy");
            describe_counter!(CRATES_REFRESHED, "Workflow versions whose crate digest changed");
            describe_counter!(CACHE_HITS, "Build cache hits");
            describe_counter!(CACHE_MISSES, "Build cache misses");
            describe_gauge!(ACTIVE_TRANSACTIONS, "Open transaction scopes");

            Self {
                handle,
                jobs_started: counter!(JOBS_STARTED),
                jobs_completed: counter!(JOBS_COMPLETED),
                jobs_retried: counter!(JOBS_RETRIED),
                jobs_skipped_stale: counter!(JOBS_SKIPPED_STALE),
                unit_failures: counter!(UNIT_FAILURES),
                instances_polled: counter!(INSTANCES_POLLED),
                notifications_created: counter!(NOTIFICATIONS_CREATED),
                periodic_builds_triggered: counter!(PERIODIC_BUILDS_TRIGGERED),
                crates_refreshed: counter!(CRATES_REFRESHED),
                cache_hits: counter!(CACHE_HITS),
                cache_misses: counter!(CACHE_MISSES),
                active_transactions: gauge!(ACTIVE_TRANSACTIONS),
            }
        })
    }

    pub fn job_started(&self) {
        self.jobs_started.increment(1);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.increment(1);
    }

    pub fn job_retried(&self) {
        self.jobs_retried.increment(1);
    }

    pub fn job_skipped_stale(&self) {
        self.jobs_skipped_stale.increment(1);
    }

    /// One workflow, version or instance failed inside a job.
    pub fn unit_failed(&self) {
        self.unit_failures.increment(1);
    }

    pub fn instance_polled(&self) {
        self.instances_polled.increment(1);
    }

    pub fn notification_created(&self) {
        self.notifications_created.increment(1);
    }

    pub fn periodic_build_triggered(&self) {
        self.periodic_builds_triggered.increment(1);
    }

    pub fn crate_refreshed(&self) {
        self.crates_refreshed.increment(1);
    }

    /// Copy cache counters and open transaction scopes into the exposition.
    pub fn observe(&self, cache: CacheStats, active_transactions: usize) {
        self.cache_hits.absolute(cache.hits);
        self.cache_misses.absolute(cache.misses);
        self.active_transactions.set(active_transactions as f64);
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let text = self.render();
        let get = |name: &str| sample(&text, name);
        MetricsSnapshot {
            jobs_started: get(JOBS_STARTED),
            jobs_completed: get(JOBS_COMPLETED),
            jobs_retried: get(JOBS_RETRIED),
            jobs_skipped_stale: get(JOBS_SKIPPED_STALE),
            unit_failures: get(UNIT_FAILURES),
            instances_polled: get(INSTANCES_POLLED),
            notifications_created: get(NOTIFICATIONS_CREATED),
            periodic_builds_triggered: get(PERIODIC_BUILDS_TRIGGERED),
            crates_refreshed: get(CRATES_REFRESHED),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Value of an unlabelled sample, 0 when absent.
fn sample(text: &str, name: &str) -> u64 {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let value = line.strip_prefix(name)?.strip_prefix(' ')?;
            value.trim().parse::<f64>().ok()
        })
        .map_or(0, |v| v as u64)
}
