//! Test build domain model: one CI run of a test instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Build status, normalized across CI backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Build still in progress.
    Running,
    /// Build finished successfully.
    Passed,
    /// Build finished with test failures.
    Failed,
    /// Build was cancelled.
    Aborted,
    /// Backend reported an unexpected or missing result.
    Error,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "aborted" => Some(Self::Aborted),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Passed or failed: the only statuses that take part in transition detection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse build result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    Failed,
}

/// Link to the console log of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLogLink {
    pub job: String,
    pub url: String,
}

/// A single CI run.
///
/// Created by a testing service adapter from backend metadata and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestBuild {
    /// Backend build identifier
    pub id: String,
    /// Monotonic build number on the backend job
    pub build_number: i64,
    /// Owning test instance (lookup only)
    pub test_instance_id: Uuid,
    pub status: BuildStatus,
    pub result: BuildResult,
    /// Start time of the run
    pub timestamp: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: i64,
    /// Built revision, when the backend reports exactly one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Backend URL of the build
    pub url: String,
    /// Human-facing link (e.g. console page)
    pub external_link: String,
}

impl TestBuild {
    pub fn is_running(&self) -> bool {
        self.status == BuildStatus::Running
    }

    pub fn is_successful(&self) -> bool {
        self.result == BuildResult::Success
    }
}

impl std::fmt::Display for TestBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestBuild {} of instance {}", self.id, self.test_instance_id)
    }
}

/// Build summary embedded in notification payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    pub build_id: String,
    pub build_number: i64,
    pub status: BuildStatus,
    pub result: BuildResult,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub external_link: String,
    pub instance: InstanceSummary,
}

/// Test instance fields carried by a build summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub uuid: Uuid,
    pub name: String,
    pub resource: String,
    pub test_suite_id: Uuid,
}
