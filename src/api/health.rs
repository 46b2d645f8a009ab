//! Health, readiness and metrics endpoints.

use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use sea_orm::ConnectionTrait;
use serde::Serialize;

use crate::db::DbPool;
use crate::tasks::TaskContext;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    database: &'static str,
}

/// Returns 200 if the service is running.
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Returns 200 if the database answers.
#[get("/ready")]
pub async fn ready(pool: web::Data<DbPool>) -> HttpResponse {
    let conn = pool.connection();
    let stmt =
        sea_orm::Statement::from_string(sea_orm::DatabaseBackend::Postgres, "SELECT 1".to_owned());
    match conn.query_one_raw(stmt).await {
        Ok(_) => HttpResponse::Ok().json(ReadyResponse {
            status: "ready",
            database: "connected",
        }),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "NOT_READY",
            "message": "Database connection failed"
        })),
    }
}

/// Job counters and cache statistics in Prometheus text format.
#[get("/metrics")]
pub async fn metrics(ctx: web::Data<TaskContext>) -> HttpResponse {
    ctx.metrics.observe(ctx.cache.stats(), ctx.transactions.active_keys());
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(ctx.metrics.render())
}

/// Configure health routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready).service(metrics);
}
