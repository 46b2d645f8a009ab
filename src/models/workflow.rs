//! Workflow and workflow version models.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::periodic_builds::{PeriodicBuildPolicy, PeriodicBuildSettings};
use super::test_instance::TestInstance;
use super::test_suite::TestSuite;
use super::user::User;
use super::workflow_status::WorkflowStatus;

/// A monitored workflow with all its registered versions.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub uuid: Uuid,
    pub name: String,
    pub versions: Vec<WorkflowVersion>,
}

impl Workflow {
    pub fn new(name: &str) -> Self {
        Workflow {
            uuid: Uuid::now_v7(),
            name: name.to_string(),
            versions: Vec::new(),
        }
    }

    /// Most recently updated version.
    pub fn latest_version(&self) -> Option<&WorkflowVersion> {
        self.versions.iter().max_by_key(|v| v.updated_at)
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Workflow '{}' ({})", self.name, self.uuid)
    }
}

/// Where the effective periodic-build policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    /// The version's own repository configuration
    Repository,
    /// The submitter's global integration settings
    Submitter,
    /// Nothing usable was found; periodic builds are disabled
    Unavailable,
}

/// One registered version of a workflow.
#[derive(Debug, Clone)]
pub struct WorkflowVersion {
    pub id: Uuid,
    pub workflow_uuid: Uuid,
    pub version: String,
    pub submitter: Option<User>,
    /// Location of the workflow crate archive
    pub ro_crate_uri: Option<String>,
    /// SHA-256 of the last downloaded crate archive
    pub crate_digest: Option<String>,
    /// Builds are pushed by an external CI app integration instead of polled
    pub github_managed: bool,
    /// Settings from the version's repository configuration file
    pub repository_config: Option<PeriodicBuildSettings>,
    pub test_suites: Vec<TestSuite>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowVersion {
    pub fn new(workflow_uuid: Uuid, version: &str) -> Self {
        WorkflowVersion {
            id: Uuid::now_v7(),
            workflow_uuid,
            version: version.to_string(),
            submitter: None,
            ro_crate_uri: None,
            crate_digest: None,
            github_managed: false,
            repository_config: None,
            test_suites: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Aggregate test status computed from the current suites.
    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus::compute(&self.test_suites)
    }

    /// All test instances across all suites.
    pub fn test_instances(&self) -> impl Iterator<Item = &TestInstance> {
        self.test_suites.iter().flat_map(|s| s.test_instances.iter())
    }

    /// Effective periodic-build policy.
    ///
    /// The repository configuration wins; the submitter's settings are used
    /// only when the repository configuration is missing or unusable.
    pub fn periodic_build_policy(&self) -> (PeriodicBuildPolicy, PolicySource) {
        match self.repository_config.as_ref().map(PeriodicBuildSettings::policy) {
            Some(Ok(policy)) => {
                debug!(version = %self, "Using repository configuration for periodic builds");
                return (policy, PolicySource::Repository);
            }
            Some(Err(e)) => {
                warn!(version = %self, error = %e, "Unusable repository configuration");
            }
            None => {
                debug!(version = %self, "No repository configuration available");
            }
        }

        let settings = self.submitter.as_ref().and_then(|u| u.settings.as_ref());
        match settings.map(PeriodicBuildSettings::policy) {
            Some(Ok(policy)) => {
                debug!(version = %self, "Using submitter settings for periodic builds");
                (policy, PolicySource::Submitter)
            }
            Some(Err(e)) => {
                warn!(version = %self, error = %e, "Unusable submitter settings");
                (PeriodicBuildPolicy::disabled(), PolicySource::Unavailable)
            }
            None => (PeriodicBuildPolicy::disabled(), PolicySource::Unavailable),
        }
    }
}

impl std::fmt::Display for WorkflowVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.workflow_uuid, self.version)
    }
}
