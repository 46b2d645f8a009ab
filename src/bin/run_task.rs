//! CLI tool to run one reconciliation job immediately.
//!
//! Usage:
//!   cargo run --bin run-task -- check_workflows
//!   cargo run --bin run-task -- check_last_build [--workflow <uuid>]...
//!   cargo run --bin run-task -- periodic_builds [--workflow <uuid>]...

use std::env;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use workflow_monitor_lib::config::Config;
use workflow_monitor_lib::db::DbPool;
use workflow_monitor_lib::services::EventBroadcaster;
use workflow_monitor_lib::tasks::{self, JOB_NAMES, TaskContext};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || matches!(args[1].as_str(), "help" | "--help" | "-h") {
        print_usage();
        std::process::exit(if args.len() < 2 { 1 } else { 0 });
    }
    let job = args[1].as_str();
    let workflows = parse_workflow_args(&args[2..]);

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match DbPool::connect(&config.database_url).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match TaskContext::with_database(&pool, EventBroadcaster::new(), &config.timeouts) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error initializing task context: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tasks::run_job(&ctx, job, &workflows).await {
        eprintln!("Error: {}", e);
        print_usage();
        std::process::exit(1);
    }

    let metrics = ctx.metrics.snapshot();
    println!(
        "{} finished: {} instance(s) polled, {} notification(s), {} periodic build(s), {} failure(s)",
        job,
        metrics.instances_polled,
        metrics.notifications_created,
        metrics.periodic_builds_triggered,
        metrics.unit_failures
    );
}

fn parse_workflow_args(args: &[String]) -> Vec<Uuid> {
    let mut workflows = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if (args[i] == "--workflow" || args[i] == "-w") && i + 1 < args.len() {
            match Uuid::parse_str(&args[i + 1]) {
                Ok(id) => workflows.push(id),
                Err(e) => {
                    eprintln!("Error: invalid workflow id '{}': {}", args[i + 1], e);
                    std::process::exit(1);
                }
            }
            i += 2;
        } else {
            eprintln!("Error: unexpected argument '{}'", args[i]);
            std::process::exit(1);
        }
    }
    workflows
}

fn print_usage() {
    eprintln!("Usage: run-task <job> [--workflow <uuid>]...");
    eprintln!();
    eprintln!("Jobs:");
    for name in JOB_NAMES {
        eprintln!("  {}", name);
    }
}
