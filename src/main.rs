//! Workflow monitor server - main entry point.
//!
//! Runs the reconciliation scheduler and serves health, metrics and live updates.

use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use workflow_monitor_lib::api;
use workflow_monitor_lib::config::Config;
use workflow_monitor_lib::db::DbPool;
use workflow_monitor_lib::services::EventBroadcaster;
use workflow_monitor_lib::tasks::{self, TaskContext};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must be set to a non-default value");
            error!("  - Timeouts (WM_*_SECS) must be positive integers");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Workflow Monitor");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let pool = DbPool::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");
    info!("Database connection established");
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");

    let broadcaster = EventBroadcaster::new();
    let ctx = TaskContext::with_database(&pool, broadcaster.clone(), &config.timeouts)
        .expect("Failed to initialize task context");

    if config.scheduler_enabled {
        let jobs = tasks::default_jobs(&config);
        let handles = tasks::start_scheduler(ctx.clone(), jobs);
        info!("Reconciliation scheduler started ({} jobs)", handles.len());
    } else {
        warn!("Reconciliation scheduler disabled (WM_SCHEDULER_ENABLED=false)");
    }

    let bind_address = config.bind_address();
    let worker_count = if config.is_development() {
        2
    } else {
        num_cpus::get()
    };
    info!(
        "Starting server at http://{} ({} workers)",
        bind_address, worker_count
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(broadcaster.clone()))
            .app_data(web::Data::new(ctx.clone()))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_websocket_routes),
            )
    })
    .workers(worker_count)
    .bind(&bind_address)?
    .run()
    .await
}
