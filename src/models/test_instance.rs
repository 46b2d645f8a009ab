//! Test instance model: one CI job bound to one test definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::build::{BuildSummary, InstanceSummary, TestBuild};
use crate::error::{AppError, AppResult};

/// Number of builds kept in the recent-builds window.
pub const RECENT_BUILDS_WINDOW: usize = 10;

/// A backend job bound to a test definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInstance {
    pub id: Uuid,
    /// Owning test suite
    pub test_suite_id: Uuid,
    pub name: String,
    /// Backend job path (e.g. `job/folder/job/name`)
    pub resource: String,
    /// Testing service this instance runs on (shared, resolved through the registry)
    pub testing_service_id: Uuid,
    /// Most recent builds, highest build number first
    #[serde(default)]
    pub recent_builds: Vec<TestBuild>,
    /// Detail of the last failed poll, cleared by the next successful one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl TestInstance {
    /// Create a new instance with no known builds.
    pub fn new(test_suite_id: Uuid, name: String, resource: String, testing_service_id: Uuid) -> Self {
        TestInstance {
            id: Uuid::now_v7(),
            test_suite_id,
            name,
            resource,
            testing_service_id,
            recent_builds: Vec::new(),
            last_refresh_error: None,
            refreshed_at: None,
        }
    }

    /// Last known build, if any.
    pub fn last_test_build(&self) -> Option<&TestBuild> {
        self.recent_builds.first()
    }

    /// Whether the last known build succeeded.
    ///
    /// Fails with the recorded testing-service error when the last poll failed,
    /// and with `NotFound` when no build is known.
    pub fn is_successful(&self) -> AppResult<bool> {
        if let Some(detail) = &self.last_refresh_error {
            return Err(AppError::TestingService(detail.clone()));
        }
        self.last_test_build()
            .map(TestBuild::is_successful)
            .ok_or_else(|| AppError::NotFound(format!("Last build of test instance {}", self.id)))
    }

    /// Replace the recent-builds window with freshly fetched builds.
    pub fn record_builds(&mut self, mut builds: Vec<TestBuild>) {
        builds.sort_by(|a, b| b.build_number.cmp(&a.build_number));
        builds.dedup_by_key(|b| b.build_number);
        builds.truncate(RECENT_BUILDS_WINDOW);
        self.recent_builds = builds;
        self.last_refresh_error = None;
        self.refreshed_at = Some(Utc::now());
    }

    /// Remember that the last poll failed; known builds are kept.
    pub fn record_refresh_error(&mut self, detail: impl Into<String>) {
        self.last_refresh_error = Some(detail.into());
        self.refreshed_at = Some(Utc::now());
    }

    /// Summary of `build` for notification payloads.
    pub fn build_summary(&self, build: &TestBuild) -> BuildSummary {
        BuildSummary {
            build_id: build.id.clone(),
            build_number: build.build_number,
            status: build.status,
            result: build.result,
            timestamp: build.timestamp,
            duration_ms: build.duration_ms,
            revision: build.revision.clone(),
            external_link: build.external_link.clone(),
            instance: InstanceSummary {
                uuid: self.id,
                name: self.name.clone(),
                resource: self.resource.clone(),
                test_suite_id: self.test_suite_id,
            },
        }
    }
}

impl std::fmt::Display for TestInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestInstance '{}' ({})", self.name, self.id)
    }
}
