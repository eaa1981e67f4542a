mod app_state;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::queue::RedisJobQueue;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing customgen API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "generation_processing_seconds",
        "Time to process a generation job"
    );
    metrics::describe_counter!("generation_jobs_total", "Total generation jobs accepted");
    metrics::describe_counter!(
        "generation_jobs_completed",
        "Total generation jobs completed"
    );
    metrics::describe_counter!("generation_jobs_failed", "Total generation job failures");
    metrics::describe_gauge!(
        "generation_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = Arc::new(
        RedisJobQueue::new(&config.redis_url, config.retry_policy())
            .expect("Failed to initialize job queue"),
    );

    // Create shared application state
    let state = AppState::new(db_pool, queue);

    // Build API routes; explicit registration, no framework magic
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/generations",
            post(routes::generate::submit_generation),
        )
        .route(
            "/api/v1/generations/{public_id}",
            get(routes::generate::get_generation),
        )
        .route(
            "/api/v1/generations/{public_id}/status",
            get(routes::generate::get_status),
        )
        .route(
            "/api/v1/generations/{public_id}/ar",
            get(routes::generate::get_ar_data),
        )
        .route(
            "/api/v1/brands/{brand_id}/generations",
            get(routes::generate::list_brand_generations),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit, JSON only

    tracing::info!("Starting customgen on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
