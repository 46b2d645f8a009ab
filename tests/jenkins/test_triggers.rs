//! Build triggering and service resolution.

use std::sync::Arc;

use workflow_monitor_lib::models::BuildStatus;
use workflow_monitor_lib::services::{BuildCache, ServiceRegistry, TestingService};

use super::mock_jenkins::MockJenkins;
use super::test_helpers::*;

#[actix_rt::test]
async fn test_start_build_invalidates_metadata() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let before = service.get_last_test_build(&instance).await.unwrap().unwrap();
    assert_eq!(before.build_number, 1);

    assert!(service.start_test_build(&instance).await.unwrap());
    assert_eq!(mock.triggered(), vec!["demo".to_string()]);

    let after = service.get_last_test_build(&instance).await.unwrap().unwrap();
    assert_eq!(after.build_number, 2);
    assert_eq!(after.status, BuildStatus::Running);
}

#[actix_rt::test]
async fn test_start_build_rejected() {
    let mock = MockJenkins::start().await;
    let (service, _) = create_service(&mock);
    let instance = instance_for("missing", service.id());

    assert!(!service.start_test_build(&instance).await.unwrap());
    assert!(mock.triggered().is_empty());
}

#[actix_rt::test]
async fn test_registry_resolves_and_shares_services() {
    let mock = MockJenkins::start().await;
    let timeouts = timeouts();
    let registry = ServiceRegistry::new(Arc::new(BuildCache::new(&timeouts)), timeouts);
    let config = service_config(&mock.url);

    assert!(registry.get(config.id).await.is_none());
    let first = registry.resolve(&config).await.unwrap();
    let second = registry.resolve(&config).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id(), config.id);
    first.check_connection().await.unwrap();
}

#[actix_rt::test]
async fn test_registry_rejects_unknown_service_type() {
    let timeouts = timeouts();
    let registry = ServiceRegistry::new(Arc::new(BuildCache::new(&timeouts)), timeouts);
    let mut config = service_config("https://ci.example.org");
    config.service_type = "travis".to_string();

    let err = registry.resolve(&config).await.err().unwrap();
    assert!(err.is_testing_service());
    assert!(registry.get(config.id).await.is_none());
}
