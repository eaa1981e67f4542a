//! In-memory fakes for the pipeline's collaborator seams, plus fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use customgen::db::{BrandStore, JobStore, ProductStore};
use customgen::models::brand::{BrandLimits, PlanTier};
use customgen::models::job::{
    GenerationJob, JobOutputs, JobStatus, NewGenerationJob,
};
use customgen::models::product::{
    ArConfig, CustomizationZone, Product, RenderStyle, ZoneType,
};
use customgen::services::events::EventSink;
use customgen::services::providers::{
    GenerateRequest, GeneratedImage, ImageProvider, ModerationVerdict, OverlaySource,
    ProviderError,
};
use customgen::services::storage::{ObjectStorage, StorageError};

// ── Fixtures ─────────────────────────────────────────────────────────

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([90, 120, 200, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn text_zone(id: &str, required: bool, max_length: u32, style: RenderStyle) -> CustomizationZone {
    CustomizationZone {
        id: id.to_string(),
        name: id.to_string(),
        zone_type: ZoneType::Text,
        required,
        max_length: Some(max_length),
        render_style: style,
        x: 8,
        y: 8,
        width: 32,
        height: 16,
    }
}

pub fn test_product(brand_id: Uuid, zones: Vec<CustomizationZone>) -> Product {
    Product {
        id: Uuid::new_v4(),
        brand_id,
        name: "Engraved Pen".to_string(),
        category: "stationery".to_string(),
        active: true,
        prompt_template: Some("A premium pen {Z1} on a desk".to_string()),
        negative_prompt: None,
        ai_provider: "mock".to_string(),
        ai_model: "mock-model-1".to_string(),
        quality: "standard".to_string(),
        output_format: "png".to_string(),
        width: 256,
        height: 256,
        base_image_url: None,
        ar: ArConfig {
            enabled: false,
            model_3d_url: None,
            tracking_type: "surface".to_string(),
            scale: 1.0,
            offset: [0.0, 0.0, 0.0],
        },
        zones,
    }
}

pub fn test_limits(brand_id: Uuid, used: i32, ceiling: i32, tier: PlanTier) -> BrandLimits {
    BrandLimits {
        brand_id,
        plan_tier: tier,
        monthly_generations: used,
        max_monthly_generations: ceiling,
    }
}

// ── Product store ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemProductStore {
    products: Mutex<Vec<Product>>,
}

impl MemProductStore {
    pub fn with(products: Vec<Product>) -> Self {
        Self {
            products: Mutex::new(products),
        }
    }
}

#[async_trait::async_trait]
impl ProductStore for MemProductStore {
    async fn get_active_product(
        &self,
        brand_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, sqlx::Error> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == product_id && p.brand_id == brand_id && p.active)
            .cloned())
    }
}

// ── Brand store ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemBrandStore {
    limits: Mutex<HashMap<Uuid, BrandLimits>>,
    usage: Mutex<Vec<(Uuid, Uuid, String, i32)>>,
}

impl MemBrandStore {
    pub fn with(limits: BrandLimits) -> Self {
        let store = Self::default();
        store
            .limits
            .lock()
            .unwrap()
            .insert(limits.brand_id, limits);
        store
    }

    pub fn monthly_generations(&self, brand_id: Uuid) -> i32 {
        self.limits.lock().unwrap()[&brand_id].monthly_generations
    }

    pub fn usage_records(&self) -> Vec<(Uuid, Uuid, String, i32)> {
        self.usage.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BrandStore for MemBrandStore {
    async fn get_brand_limits(&self, brand_id: Uuid) -> Result<Option<BrandLimits>, sqlx::Error> {
        Ok(self.limits.lock().unwrap().get(&brand_id).cloned())
    }

    async fn increment_monthly_generations(&self, brand_id: Uuid) -> Result<(), sqlx::Error> {
        if let Some(limits) = self.limits.lock().unwrap().get_mut(&brand_id) {
            limits.monthly_generations += 1;
        }
        Ok(())
    }

    async fn record_generation_usage(
        &self,
        brand_id: Uuid,
        job_id: Uuid,
        model: &str,
        cost_cents: i32,
    ) -> Result<(), sqlx::Error> {
        let mut usage = self.usage.lock().unwrap();
        // Idempotent per job id, mirroring the unique constraint in Postgres.
        if !usage.iter().any(|(_, j, _, _)| *j == job_id) {
            usage.push((brand_id, job_id, model.to_string(), cost_cents));
        }
        Ok(())
    }
}

// ── Job store ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemJobStore {
    jobs: Mutex<HashMap<Uuid, GenerationJob>>,
}

impl MemJobStore {
    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl JobStore for MemJobStore {
    async fn create_job(&self, new: &NewGenerationJob) -> Result<GenerationJob, sqlx::Error> {
        let now = Utc::now();
        let job = GenerationJob {
            id: Uuid::new_v4(),
            public_id: NewGenerationJob::generate_public_id(),
            brand_id: new.brand_id,
            product_id: new.product_id,
            customizations: new.customizations.clone(),
            user_hint: new.user_hint.clone(),
            session_id: new.session_id.clone(),
            client_ip: new.client_ip.clone(),
            user_agent: new.user_agent.clone(),
            referrer: new.referrer.clone(),
            prompt: new.prompt.clone(),
            negative_prompt: new.negative_prompt.clone(),
            provider: new.provider.clone(),
            model: new.model.clone(),
            quality: new.quality.clone(),
            output_format: new.output_format.clone(),
            width: new.width,
            height: new.height,
            status: JobStatus::Pending,
            tokens_used: None,
            cost_cents: None,
            processing_ms: None,
            error_message: None,
            error_code: None,
            retry_count: 0,
            ar_view_count: 0,
            viewed_in_ar: false,
            output_image_url: None,
            thumbnail_url: None,
            ar_model_url: None,
            provider_metadata: None,
            created_at: now,
            completed_at: None,
            expires_at: now + ChronoDuration::hours(24),
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<GenerationJob>, sqlx::Error> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|j| j.public_id == public_id)
            .cloned())
    }

    async fn list_recent_for_brand(
        &self,
        brand_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        let now = Utc::now();
        let mut jobs: Vec<GenerationJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.brand_id == brand_id && !j.is_abandoned(now))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status != JobStatus::Completed => {
                job.status = JobStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_completed(&self, id: Uuid, outputs: &JobOutputs) -> Result<(), sqlx::Error> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status != JobStatus::Completed {
                job.status = JobStatus::Completed;
                job.output_image_url = Some(outputs.output_image_url.clone());
                job.thumbnail_url = Some(outputs.thumbnail_url.clone());
                job.ar_model_url = outputs.ar_model_url.clone();
                job.cost_cents = Some(outputs.cost_cents);
                job.tokens_used = outputs.tokens_used;
                job.processing_ms = Some(outputs.processing_ms);
                job.provider_metadata = Some(outputs.provider_metadata.clone());
                job.error_message = None;
                job.error_code = None;
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status != JobStatus::Completed {
                job.status = JobStatus::Failed;
                job.error_code = Some(error_code.to_string());
                job.error_message = Some(error_message.to_string());
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn increment_retry(&self, id: Uuid) -> Result<i32, sqlx::Error> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(sqlx::Error::RowNotFound)?;
        job.retry_count += 1;
        Ok(job.retry_count)
    }

    async fn increment_ar_views(&self, public_id: &str) -> Result<(), sqlx::Error> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.values_mut().find(|j| j.public_id == public_id) {
            job.ar_view_count += 1;
            job.viewed_in_ar = true;
        }
        Ok(())
    }
}

// ── Object storage ───────────────────────────────────────────────────

/// In-memory storage. Uploads land under `https://assets.test/<key>`;
/// arbitrary external URLs can be registered as fetchable or failing.
#[derive(Default)]
pub struct MemStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    external: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<Vec<String>>,
}

pub const ASSET_BASE: &str = "https://assets.test";

impl MemStorage {
    pub fn register_external(&self, url: &str, bytes: Vec<u8>) {
        self.external.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn register_failing(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemStorage {
    async fn upload(
        &self,
        data: &[u8],
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(format!("{ASSET_BASE}/{key}"))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(StorageError::Config(format!("simulated failure for {url}")));
        }
        if let Some(key) = url.strip_prefix(&format!("{ASSET_BASE}/")) {
            return self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::Config(format!("no object at {key}")));
        }
        self.external
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| StorageError::Config(format!("unknown url {url}")))
    }
}

// ── Provider ─────────────────────────────────────────────────────────

pub enum MockBehavior {
    /// Return these bytes as the overlay.
    Succeed(Vec<u8>),
    /// Fail every generate call.
    Fail,
    /// Reject at the moderation gate.
    Block,
}

pub struct MockProvider {
    behavior: MockBehavior,
    pub generate_calls: AtomicU32,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            generate_calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ImageProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Succeed(bytes) => Ok(GeneratedImage {
                image: OverlaySource::Bytes(bytes.clone()),
                cost_cents: 4,
                tokens_used: Some(12),
                raw: serde_json::json!({ "mock": true }),
            }),
            _ => Err(ProviderError::Api {
                status: 500,
                message: "mock provider failure".to_string(),
            }),
        }
    }

    fn estimate_cost_cents(&self, _request: &GenerateRequest) -> i32 {
        4
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn moderate_prompt(&self, _prompt: &str) -> Result<ModerationVerdict, ProviderError> {
        match self.behavior {
            MockBehavior::Block => Ok(ModerationVerdict {
                approved: false,
                reason: Some("blocked by test moderation".to_string()),
            }),
            _ => Ok(ModerationVerdict::approve()),
        }
    }
}

// ── Event sink ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct CaptureEventSink {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl CaptureEventSink {
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventSink for CaptureEventSink {
    async fn emit(&self, event: &str, payload: serde_json::Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
    }
}
