//! Build discovery against the mock Jenkins server.

use workflow_monitor_lib::error::AppError;
use workflow_monitor_lib::models::{BuildResult, BuildStatus};
use workflow_monitor_lib::services::TestingService;

use super::mock_jenkins::{BASE_TIMESTAMP_MS, MockJenkins};
use super::test_helpers::*;

#[actix_rt::test]
async fn test_check_connection() {
    let mock = MockJenkins::start().await;
    let (service, _) = create_service(&mock);

    service.check_connection().await.expect("connection should succeed");
    assert_eq!(mock.hits("/api/json"), 1);
    assert_eq!(service.service_type(), "jenkins");
    assert_eq!(service.url(), mock.url);
}

#[actix_rt::test]
async fn test_check_connection_unreachable() {
    let config = service_config("http://127.0.0.1:9");
    let timeouts = timeouts();
    let cache = std::sync::Arc::new(workflow_monitor_lib::services::BuildCache::new(&timeouts));
    let service =
        workflow_monitor_lib::services::testing_service::JenkinsService::new(&config, cache, &timeouts)
            .unwrap();

    let err = service.check_connection().await.unwrap_err();
    assert!(err.is_testing_service(), "unexpected error: {:?}", err);
}

#[actix_rt::test]
async fn test_project_metadata() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    mock.add_build("demo", false, Some("FAILURE"));
    mock.add_build("demo", false, Some("SUCCESS"));
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let metadata = service.get_project_metadata(&instance, false).await.unwrap();

    assert_eq!(metadata.url, format!("{}/job/demo/", mock.url));
    let numbers: Vec<i64> = metadata.builds.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![3, 2, 1]);
    assert_eq!(metadata.last_build.unwrap().number, 3);
    assert_eq!(metadata.last_successful_build.unwrap().number, 3);
    assert_eq!(metadata.last_failed_build.unwrap().number, 2);

    let all = service.get_project_metadata(&instance, true).await.unwrap();
    assert_eq!(all.builds.len(), 3);
    assert_eq!(
        service.get_instance_external_link(&instance).await.unwrap(),
        format!("{}/job/demo/", mock.url)
    );
}

#[actix_rt::test]
async fn test_metadata_is_cached_until_invalidated() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    let (service, cache) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    service.get_project_metadata(&instance, false).await.unwrap();
    service.get_project_metadata(&instance, false).await.unwrap();
    assert_eq!(mock.hits("/job/demo/api/json"), 1);

    cache.invalidate_instance(instance.id).await;
    service.get_project_metadata(&instance, false).await.unwrap();
    assert_eq!(mock.hits("/job/demo/api/json"), 2);
}

#[actix_rt::test]
async fn test_full_history_only_beyond_page_size() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    mock.add_build("demo", false, Some("FAILURE"));
    let (service, cache) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let builds = service.get_test_builds(&instance, 100).await.unwrap();
    assert_eq!(builds.len(), 2);
    assert_eq!(mock.hits("/job/demo/api/json"), 1);
    assert_eq!(mock.hits("/job/demo/api/json?tree=allBuilds"), 0);

    cache.invalidate_instance(instance.id).await;
    let builds = service.get_test_builds(&instance, 101).await.unwrap();
    assert_eq!(builds.len(), 2);
    assert_eq!(mock.hits("/job/demo/api/json?tree=allBuilds"), 1);
}

#[actix_rt::test]
async fn test_unknown_job_is_testing_service_error() {
    let mock = MockJenkins::start().await;
    let (service, _) = create_service(&mock);
    let instance = instance_for("missing", service.id());

    let err = service.get_project_metadata(&instance, false).await.unwrap_err();
    assert!(err.is_testing_service(), "unexpected error: {:?}", err);
    assert!(err.detail().contains("missing"));
}

#[actix_rt::test]
async fn test_get_test_builds_maps_and_sorts() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    mock.add_build("demo", false, Some("FAILURE"));
    mock.add_build("demo", false, Some("ABORTED"));
    mock.add_build("demo", true, None);
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let builds = service.get_test_builds(&instance, 10).await.unwrap();

    let statuses: Vec<(i64, BuildStatus)> =
        builds.iter().map(|b| (b.build_number, b.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (4, BuildStatus::Running),
            (3, BuildStatus::Aborted),
            (2, BuildStatus::Failed),
            (1, BuildStatus::Passed),
        ]
    );

    let first = builds.last().unwrap();
    assert_eq!(first.id, "1");
    assert_eq!(first.test_instance_id, instance.id);
    assert_eq!(first.result, BuildResult::Success);
    assert_eq!(first.duration_ms, 1500);
    assert_eq!(first.timestamp.timestamp_millis(), BASE_TIMESTAMP_MS + 60_000);
    assert_eq!(first.revision.as_deref(), Some(format!("{:040x}", 1).as_str()));
    assert_eq!(first.external_link, format!("{}/job/demo/1/console", mock.url));

    let logs = service.get_test_build_logs_external_link(first);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].job, "default");
    assert_eq!(logs[0].url, format!("{}/job/demo/1/consoleText", mock.url));
}

#[actix_rt::test]
async fn test_get_test_builds_respects_limit() {
    let mock = MockJenkins::start().await;
    for _ in 0..5 {
        mock.add_build("demo", false, Some("SUCCESS"));
    }
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let builds = service.get_test_builds(&instance, 2).await.unwrap();
    let numbers: Vec<i64> = builds.iter().map(|b| b.build_number).collect();
    assert_eq!(numbers, vec![5, 4]);
    assert_eq!(mock.hits("/job/demo/3/api/json"), 0);
}

#[actix_rt::test]
async fn test_job_without_builds() {
    let mock = MockJenkins::start().await;
    mock.set_console("empty", 1, "");
    let (service, _) = create_service(&mock);
    let instance = instance_for("empty", service.id());

    assert!(service.get_test_builds(&instance, 10).await.unwrap().is_empty());
    assert!(service.get_last_test_build(&instance).await.unwrap().is_none());
}

#[actix_rt::test]
async fn test_unknown_build_is_not_found() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let err = service.get_test_build(&instance, 42).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "unexpected error: {:?}", err);
}

#[actix_rt::test]
async fn test_last_passed_and_failed_builds() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("FAILURE"));
    mock.add_build("demo", false, Some("SUCCESS"));
    mock.add_build("demo", false, Some("ABORTED"));
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let last = service.get_last_test_build(&instance).await.unwrap().unwrap();
    assert_eq!(last.build_number, 3);
    let passed = service.get_last_passed_test_build(&instance).await.unwrap().unwrap();
    assert_eq!(passed.build_number, 2);
    let failed = service.get_last_failed_test_build(&instance).await.unwrap().unwrap();
    assert_eq!(failed.build_number, 1);
}

#[actix_rt::test]
async fn test_finished_builds_are_cached() {
    let mock = MockJenkins::start().await;
    mock.add_build("demo", false, Some("SUCCESS"));
    let (service, cache) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    service.get_test_build(&instance, 1).await.unwrap();
    service.get_test_build(&instance, 1).await.unwrap();

    assert_eq!(mock.hits("/job/demo/1/api/json"), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[actix_rt::test]
async fn test_running_builds_are_refetched() {
    let mock = MockJenkins::start().await;
    let number = mock.add_build("demo", true, None);
    let (service, _) = create_service(&mock);
    let instance = instance_for("demo", service.id());

    let running = service.get_test_build(&instance, number).await.unwrap();
    assert_eq!(running.status, BuildStatus::Running);

    mock.finish_build("demo", number, "FAILURE");
    let finished = service.get_test_build(&instance, number).await.unwrap();
    assert_eq!(finished.status, BuildStatus::Failed);
    assert_eq!(mock.hits(&format!("/job/demo/{}/api/json", number)), 2);
}
