//! Console output retrieval and slicing.

use workflow_monitor_lib::error::AppError;
use workflow_monitor_lib::models::TestInstance;
use workflow_monitor_lib::services::TestingService;
use workflow_monitor_lib::services::testing_service::JenkinsService;

use super::mock_jenkins::MockJenkins;
use super::test_helpers::*;

const LOG: &str = "Started by timer\nRunning tests\nFinished: SUCCESS\n";

async fn setup() -> (MockJenkins, JenkinsService, TestInstance) {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    mock.set_console("demo", 1, LOG);
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());
    (mock, service, instance)
}

#[actix_rt::test]
async fn test_full_output() {
    let (_mock, service, instance) = setup().await;

    let output = service.get_test_build_output(&instance, 1, 0, 0).await.unwrap();
    assert_eq!(output, LOG.as_bytes());
}

#[actix_rt::test]
async fn test_output_window() {
    let (_mock, service, instance) = setup().await;

    let output = service.get_test_build_output(&instance, 1, 8, 5).await.unwrap();
    assert_eq!(output, b"by ti");

    let tail = service.get_test_build_output(&instance, 1, 17, 0).await.unwrap();
    assert_eq!(tail, &LOG.as_bytes()[17..]);
}

#[actix_rt::test]
async fn test_output_window_is_clamped() {
    let (_mock, service, instance) = setup().await;
    let len = LOG.len() as i64;

    let output = service
        .get_test_build_output(&instance, 1, len - 4, 100)
        .await
        .unwrap();
    assert_eq!(output, b"ESS\n");

    let empty = service.get_test_build_output(&instance, 1, len, 10).await.unwrap();
    assert!(empty.is_empty());
}

#[actix_rt::test]
async fn test_invalid_output_window() {
    let (_mock, service, instance) = setup().await;
    let len = LOG.len() as i64;

    let err = service
        .get_test_build_output(&instance, 1, len + 1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)), "unexpected error: {:?}", err);

    let err = service.get_test_build_output(&instance, 1, -1, 0).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = service.get_test_build_output(&instance, 1, 0, -5).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[actix_rt::test]
async fn test_missing_console_is_not_found() {
    let (_mock, service, instance) = setup().await;

    let err = service.get_test_build_output(&instance, 7, 0, 0).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "unexpected error: {:?}", err);
}
