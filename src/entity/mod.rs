//! SeaORM entity definitions for PostgreSQL database.

pub mod notification;
pub mod test_instance;
pub mod test_suite;
pub mod testing_service;
pub mod user;
pub mod user_notification;
pub mod workflow;
pub mod workflow_subscription;
pub mod workflow_version;
