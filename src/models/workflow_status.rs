//! Aggregate test status of a workflow version.
//!
//! The status is a pure reduction over already-fetched instance data: it
//! never talks to a CI backend and never fails on partial data. Instances
//! whose status cannot be determined become availability issues.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::build::TestBuild;
use super::test_suite::TestSuite;
use crate::error::AppError;

pub const NO_TEST_SUITE: &str = "No test suite available";
pub const NO_TEST_INSTANCES: &str = "No test instances available";
pub const NO_BUILD_FOUND: &str = "No build found";

/// Workflow-wide reduction of all instance outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateTestStatus {
    NotAvailable,
    AllPassing,
    AllFailing,
    SomePassing,
}

impl AggregateTestStatus {
    /// Fold one instance outcome into the accumulator.
    pub fn update(self, passed: bool) -> Self {
        match (self, passed) {
            (Self::NotAvailable, true) => Self::AllPassing,
            (Self::NotAvailable, false) => Self::AllFailing,
            (Self::AllPassing, true) => Self::AllPassing,
            (Self::AllFailing, false) => Self::AllFailing,
            (Self::AllPassing, false) | (Self::AllFailing, true) | (Self::SomePassing, _) => {
                Self::SomePassing
            }
        }
    }

    /// Fold a sequence of outcomes, starting from `NotAvailable`.
    pub fn fold(outcomes: impl IntoIterator<Item = bool>) -> Self {
        outcomes
            .into_iter()
            .fold(Self::NotAvailable, Self::update)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAvailable => "not_available",
            Self::AllPassing => "all_passing",
            Self::AllFailing => "all_failing",
            Self::SomePassing => "some_passing",
        }
    }
}

impl std::fmt::Display for AggregateTestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why part of a workflow could not contribute to its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityIssue {
    pub issue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<Uuid>,
}

impl AvailabilityIssue {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            resource: None,
            instance: None,
        }
    }
}

/// Computed status snapshot; recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub aggregated_status: AggregateTestStatus,
    pub latest_builds: Vec<TestBuild>,
    pub availability_issues: Vec<AvailabilityIssue>,
}

impl WorkflowStatus {
    fn unavailable(issue: &str) -> Self {
        Self {
            aggregated_status: AggregateTestStatus::NotAvailable,
            latest_builds: Vec::new(),
            availability_issues: vec![AvailabilityIssue::new(issue)],
        }
    }

    /// Reduce all instances of `suites` into one status.
    pub fn compute(suites: &[TestSuite]) -> Self {
        if suites.is_empty() {
            return Self::unavailable(NO_TEST_SUITE);
        }

        let mut status = AggregateTestStatus::NotAvailable;
        let mut latest_builds = Vec::new();
        let mut availability_issues = Vec::new();
        let mut instances = 0usize;

        for instance in suites.iter().flat_map(|s| s.test_instances.iter()) {
            instances += 1;
            if let Some(build) = instance.last_test_build() {
                latest_builds.push(build.clone());
            }
            match instance.is_successful() {
                Ok(passed) => status = status.update(passed),
                Err(e) => {
                    debug!(instance = %instance.id, error = %e, "Instance excluded from status");
                    let issue = match e {
                        AppError::NotFound(_) => NO_BUILD_FOUND.to_string(),
                        other => other.to_string(),
                    };
                    availability_issues.push(AvailabilityIssue {
                        issue,
                        resource: Some(instance.resource.clone()),
                        instance: Some(instance.id),
                    });
                }
            }
        }

        if instances == 0 {
            return Self::unavailable(NO_TEST_INSTANCES);
        }

        Self {
            aggregated_status: status,
            latest_builds,
            availability_issues,
        }
    }
}
