//! Domain models for the workflow monitor.

pub mod build;
pub mod notification;
pub mod periodic_builds;
pub mod test_instance;
pub mod test_suite;
pub mod user;
pub mod workflow;
pub mod workflow_status;
pub mod ws_event;

// Re-export commonly used types
pub use build::{BuildLogLink, BuildResult, BuildStatus, BuildSummary, InstanceSummary, TestBuild};
pub use notification::{EventType, NewNotification, Notification};
pub use periodic_builds::{PeriodicBuildPolicy, PeriodicBuildSettings};
pub use test_instance::{RECENT_BUILDS_WINDOW, TestInstance};
pub use test_suite::TestSuite;
pub use user::User;
pub use workflow::{PolicySource, Workflow, WorkflowVersion};
pub use workflow_status::{AggregateTestStatus, AvailabilityIssue, WorkflowStatus};
pub use ws_event::{WsEvent, WsEventMessage};
