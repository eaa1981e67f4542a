use std::sync::Arc;

use crate::db::{BrandStore, JobStore, ProductStore};
use crate::error::CreateError;
use crate::models::generation::{CreateGenerationRequest, CreateGenerationResponse};
use crate::models::job::{CustomizationMap, JobStatus, NewGenerationJob, QueuedJob};
use crate::models::product::{CustomizationZone, ZoneType};
use crate::services::prompt;
use crate::services::queue::JobQueue;

/// Request metadata captured off the transport, write-once on the job record.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// Accepts generation requests: validates against product/brand state and
/// quota, builds the prompt, persists the PENDING record, and enqueues work.
/// Runs inline with the inbound request; everything slow happens in the worker.
pub struct Orchestrator {
    products: Arc<dyn ProductStore>,
    brands: Arc<dyn BrandStore>,
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl Orchestrator {
    pub fn new(
        products: Arc<dyn ProductStore>,
        brands: Arc<dyn BrandStore>,
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            products,
            brands,
            jobs,
            queue,
        }
    }

    pub async fn create(
        &self,
        request: CreateGenerationRequest,
        meta: RequestMeta,
    ) -> Result<CreateGenerationResponse, CreateError> {
        let product = self
            .products
            .get_active_product(request.brand_id, request.product_id)
            .await?
            .ok_or(CreateError::NotFound)?;

        let limits = self
            .brands
            .get_brand_limits(request.brand_id)
            .await?
            .ok_or(CreateError::NotFound)?;

        if limits.at_quota() {
            tracing::info!(
                brand_id = %request.brand_id,
                used = limits.monthly_generations,
                ceiling = limits.max_monthly_generations,
                "generation rejected, monthly quota reached"
            );
            return Err(CreateError::QuotaExceeded);
        }

        validate_customizations(&product.zones, &request.customizations)?;

        let (final_prompt, negative_prompt) = prompt::build_prompt(
            &product,
            &request.customizations,
            request.user_hint.as_deref(),
        );

        let new_job = NewGenerationJob {
            brand_id: request.brand_id,
            product_id: product.id,
            customizations: request.customizations,
            user_hint: request.user_hint,
            session_id: request.session_id,
            client_ip: meta.client_ip,
            user_agent: meta.user_agent,
            referrer: meta.referrer,
            prompt: final_prompt,
            negative_prompt,
            provider: product.ai_provider.clone(),
            model: product.ai_model.clone(),
            quality: product.quality.clone(),
            output_format: product.output_format.clone(),
            width: product.width,
            height: product.height,
        };

        let job = self.jobs.create_job(&new_job).await?;

        // Counts against the monthly ceiling regardless of eventual outcome;
        // billable cost is recorded separately, on success only. The two
        // counters are intentionally decoupled.
        self.brands
            .increment_monthly_generations(request.brand_id)
            .await?;

        let priority = limits.plan_tier.queue_priority();
        self.queue
            .enqueue(&QueuedJob {
                job_id: job.id,
                priority,
                attempt: 0,
            })
            .await?;

        metrics::counter!("generation_jobs_total").increment(1);

        tracing::info!(
            job_id = %job.id,
            public_id = %job.public_id,
            brand_id = %request.brand_id,
            product_id = %product.id,
            provider = %job.provider,
            priority,
            "generation job accepted and enqueued"
        );

        Ok(CreateGenerationResponse {
            public_id: job.public_id.clone(),
            status: JobStatus::Pending,
            estimated_seconds: limits.plan_tier.estimated_seconds(),
            status_url: format!("/api/v1/generations/{}/status", job.public_id),
        })
    }
}

/// Fail-fast validation of supplied customizations against the product's
/// zones. The first violated constraint is reported with its zone id.
fn validate_customizations(
    zones: &[CustomizationZone],
    customizations: &CustomizationMap,
) -> Result<(), CreateError> {
    for zone in zones {
        let value = customizations.get(&zone.id).filter(|v| !v.is_empty());

        if zone.required && value.is_none() {
            return Err(CreateError::ValidationFailed {
                zone: zone.id.clone(),
                reason: "required customization missing".to_string(),
            });
        }

        if zone.zone_type == ZoneType::Text {
            if let (Some(value), Some(max_length)) = (value, zone.max_length) {
                let len = value.text.as_deref().map_or(0, |t| t.chars().count());
                if len > max_length as usize {
                    return Err(CreateError::ValidationFailed {
                        zone: zone.id.clone(),
                        reason: format!("text exceeds maximum length of {max_length}"),
                    });
                }
            }
        }
    }
    Ok(())
}
