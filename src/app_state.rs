use sqlx::PgPool;
use std::sync::Arc;

use crate::db::{catalog_queries::PgBrandStore, catalog_queries::PgProductStore,
    job_queries::PgJobStore, BrandStore, JobStore, ProductStore};
use crate::services::orchestrator::Orchestrator;
use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jobs: Arc<dyn JobStore>,
    pub products: Arc<dyn ProductStore>,
    pub brands: Arc<dyn BrandStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<dyn JobQueue>,
}

impl AppState {
    pub fn new(db: PgPool, queue: Arc<dyn JobQueue>) -> Self {
        let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db.clone()));
        let products: Arc<dyn ProductStore> = Arc::new(PgProductStore::new(db.clone()));
        let brands: Arc<dyn BrandStore> = Arc::new(PgBrandStore::new(db.clone()));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&products),
            Arc::clone(&brands),
            Arc::clone(&jobs),
            queue.clone(),
        ));

        Self {
            db,
            jobs,
            products,
            brands,
            orchestrator,
            queue,
        }
    }
}
