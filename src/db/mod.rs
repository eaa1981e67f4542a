use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::brand::BrandLimits;
use crate::models::job::{GenerationJob, JobOutputs, NewGenerationJob};
use crate::models::product::Product;

pub mod catalog_queries;
pub mod job_queries;

/// Requests not completed within this horizon are considered abandoned and
/// excluded from default listings.
pub const JOB_EXPIRY_HOURS: i64 = 24;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Product/zone lookup, owned by the catalog collaborator. Read-only here.
#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_active_product(
        &self,
        brand_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, sqlx::Error>;
}

/// Brand plan limits and usage accounting.
#[async_trait::async_trait]
pub trait BrandStore: Send + Sync {
    async fn get_brand_limits(&self, brand_id: Uuid) -> Result<Option<BrandLimits>, sqlx::Error>;

    /// Atomic single-statement increment; no read-modify-write.
    async fn increment_monthly_generations(&self, brand_id: Uuid) -> Result<(), sqlx::Error>;

    /// Records billable cost for a completed job. Idempotent per job id, so a
    /// redelivered job cannot double-charge.
    async fn record_generation_usage(
        &self,
        brand_id: Uuid,
        job_id: Uuid,
        model: &str,
        cost_cents: i32,
    ) -> Result<(), sqlx::Error>;
}

/// Durable store for generation job records.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, new: &NewGenerationJob) -> Result<GenerationJob, sqlx::Error>;

    async fn get_job(&self, id: Uuid) -> Result<Option<GenerationJob>, sqlx::Error>;

    async fn get_by_public_id(&self, public_id: &str)
        -> Result<Option<GenerationJob>, sqlx::Error>;

    /// Recent jobs for a brand, excluding abandoned (expired, never completed)
    /// records.
    async fn list_recent_for_brand(
        &self,
        brand_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GenerationJob>, sqlx::Error>;

    /// Transition to PROCESSING. Returns false if the transition was refused
    /// (job already COMPLETED, e.g. a queue redelivery after success).
    async fn mark_processing(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    async fn mark_completed(&self, id: Uuid, outputs: &JobOutputs) -> Result<(), sqlx::Error>;

    async fn mark_failed(
        &self,
        id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), sqlx::Error>;

    async fn increment_retry(&self, id: Uuid) -> Result<i32, sqlx::Error>;

    /// AR-view tracking: increments the counter as a side effect of the AR
    /// payload being read.
    async fn increment_ar_views(&self, public_id: &str) -> Result<(), sqlx::Error>;
}
