//! `/metrics`: Prometheus exposition of the job counters.

use actix_web::{App, test, web};
use workflow_monitor_lib::api::configure_health_routes;
use workflow_monitor_lib::models::BuildStatus;
use workflow_monitor_lib::services::TestingService;
use workflow_monitor_lib::tasks::check_last_build;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_metrics_endpoint_renders_job_counters() {
    let h = create_harness().await;
    let workflow = workflow_with_instances("wf", h.service.id(), 2);
    for instance in instance_ids(&workflow) {
        h.service
            .set_builds(instance, vec![build(instance, 1, BuildStatus::Passed)])
            .await;
    }
    h.store.add(workflow).await;
    check_last_build(&h.ctx, None).await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.ctx.clone()))
            .configure(configure_health_routes),
    )
    .await;
    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("# TYPE monitor_instances_polled_total counter"));
    assert!(text.contains("monitor_instances_polled_total 2"));
    assert!(text.contains("monitor_cache_misses_total"));
    assert!(text.contains("monitor_active_transactions"));
}
