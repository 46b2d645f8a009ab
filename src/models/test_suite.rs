//! Test suite model: a named group of test instances of one workflow version.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::test_instance::TestInstance;

/// Named collection of test instances, owned by one workflow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: Uuid,
    /// Owning workflow version
    pub workflow_version_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub test_instances: Vec<TestInstance>,
}

impl TestSuite {
    /// Create a new test suite.
    pub fn new(workflow_version_id: Uuid, name: String) -> Self {
        TestSuite {
            id: Uuid::now_v7(),
            workflow_version_id,
            name,
            test_instances: Vec::new(),
        }
    }

    /// Add an instance; an instance with the same id replaces the existing one.
    pub fn add_instance(&mut self, instance: TestInstance) {
        match self.test_instances.iter_mut().find(|i| i.id == instance.id) {
            Some(existing) => *existing = instance,
            None => self.test_instances.push(instance),
        }
    }
}

impl std::fmt::Display for TestSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestSuite '{}' ({})", self.name, self.id)
    }
}
