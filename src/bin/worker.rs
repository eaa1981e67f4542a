use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use customgen::{
    config::AppConfig,
    db::{self, catalog_queries::PgBrandStore, catalog_queries::PgProductStore,
        job_queries::PgJobStore, BrandStore, JobStore, ProductStore},
    services::{
        events::{EventSink, NoopEventSink, WebhookEventSink},
        providers::{openai::OpenAiProvider, stability::StabilityProvider, ImageProvider,
            ProviderRegistry},
        queue::{JobQueue, RedisJobQueue},
        storage::{ObjectStorage, R2Storage},
        worker::GenerationWorker,
    },
};

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting generation worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");

    // One HTTP client shared by providers, storage downloads, and the event
    // sink; its timeout bounds every provider call and image transfer.
    let http = reqwest::Client::builder()
        .timeout(config.provider_timeout())
        .build()
        .expect("Failed to build HTTP client");

    let storage: Arc<dyn ObjectStorage> = Arc::new(
        R2Storage::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
            &config.public_asset_base_url,
            http.clone(),
        )
        .expect("Failed to initialize R2 storage"),
    );

    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::new(&config.redis_url, config.retry_policy())
            .expect("Failed to initialize job queue"),
    );

    let providers = Arc::new(ProviderRegistry::new(
        vec![
            Arc::new(OpenAiProvider::new(
                http.clone(),
                config.openai_api_key.clone(),
            )) as Arc<dyn ImageProvider>,
            Arc::new(StabilityProvider::new(
                http.clone(),
                config.stability_api_key.clone(),
            )) as Arc<dyn ImageProvider>,
        ],
        &config.default_provider,
    ));

    let events: Arc<dyn EventSink> = match &config.event_webhook_url {
        Some(url) => Arc::new(WebhookEventSink::new(http.clone(), url.clone())),
        None => Arc::new(NoopEventSink),
    };

    let provider_names: Vec<String> = providers.names().iter().map(|s| s.to_string()).collect();

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool.clone()));
    let products: Arc<dyn ProductStore> = Arc::new(PgProductStore::new(db_pool.clone()));
    let brands: Arc<dyn BrandStore> = Arc::new(PgBrandStore::new(db_pool));

    let worker = Arc::new(GenerationWorker::new(
        jobs,
        products,
        brands,
        queue,
        providers,
        storage,
        events,
        config.retry_policy(),
    ));

    tracing::info!(
        concurrency = config.worker_concurrency,
        providers = ?provider_names,
        "Worker ready, starting job processing loops"
    );

    // A pool of worker slots, each pulling one job at a time. Pool size bounds
    // concurrent provider calls.
    let mut handles = Vec::new();
    for slot in 0..config.worker_concurrency.max(1) {
        let worker = Arc::clone(&worker);
        handles.push(tokio::spawn(async move {
            tracing::debug!(slot, "worker slot started");
            worker.run(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}
