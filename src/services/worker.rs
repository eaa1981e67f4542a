use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::db::{BrandStore, JobStore, ProductStore};
use crate::error::ProcessError;
use crate::models::job::{GenerationJob, JobOutputs, JobStatus, QueuedJob};
use crate::services::compose;
use crate::services::events::EventSink;
use crate::services::providers::{GenerateRequest, OverlaySource, ProviderError, ProviderRegistry};
use crate::services::queue::{JobQueue, QueueError, RetryPolicy};
use crate::services::storage::ObjectStorage;

/// Queue consumer: drives provider call -> download -> compose -> thumbnail ->
/// upload -> persist -> usage accounting -> event emission for one job at a
/// time.
pub struct GenerationWorker {
    jobs: Arc<dyn JobStore>,
    products: Arc<dyn ProductStore>,
    brands: Arc<dyn BrandStore>,
    queue: Arc<dyn JobQueue>,
    providers: Arc<ProviderRegistry>,
    storage: Arc<dyn ObjectStorage>,
    events: Arc<dyn EventSink>,
    retry_policy: RetryPolicy,
}

impl GenerationWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        products: Arc<dyn ProductStore>,
        brands: Arc<dyn BrandStore>,
        queue: Arc<dyn JobQueue>,
        providers: Arc<ProviderRegistry>,
        storage: Arc<dyn ObjectStorage>,
        events: Arc<dyn EventSink>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            jobs,
            products,
            brands,
            queue,
            providers,
            storage,
            events,
            retry_policy,
        }
    }

    /// Poll-process loop for one worker slot. Each slot blocks only on its own
    /// job.
    pub async fn run(self: Arc<Self>, poll_interval: Duration) {
        loop {
            match self.poll_once().await {
                Ok(true) => {
                    tracing::debug!("job processed, checking for next job");
                }
                Ok(false) => {
                    tokio::time::sleep(poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "queue error, backing off");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Take and process at most one job. Returns Ok(true) if a job was
    /// handled, Ok(false) if the queue was empty.
    pub async fn poll_once(&self) -> Result<bool, QueueError> {
        if let Ok(depth) = self.queue.queue_depth().await {
            metrics::gauge!("generation_queue_depth").set(depth as f64);
        }

        let queued = match self.queue.dequeue().await? {
            Some(q) => q,
            None => return Ok(false),
        };

        self.process_delivery(&queued).await?;
        Ok(true)
    }

    async fn process_delivery(&self, queued: &QueuedJob) -> Result<(), QueueError> {
        let retry_delay = self.retry_policy.delay_for_attempt(queued.attempt);

        let record = match self.jobs.get_job(queued.job_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(job_id = %queued.job_id, "queued job has no record, dropping");
                return self.queue.ack(queued).await;
            }
            Err(e) => {
                tracing::error!(job_id = %queued.job_id, error = %e, "failed to load job record");
                return self.queue.nack(queued, retry_delay).await;
            }
        };

        // Redelivery after a successful completion: the record is terminal and
        // its outputs are already valid, nothing to redo.
        if record.status == JobStatus::Completed {
            tracing::info!(job_id = %record.id, "job already completed, skipping redelivery");
            return self.queue.ack(queued).await;
        }

        match self.jobs.mark_processing(record.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(job_id = %record.id, "processing transition refused, skipping");
                return self.queue.ack(queued).await;
            }
            Err(e) => {
                tracing::error!(job_id = %record.id, error = %e, "failed to mark processing");
                return self.queue.nack(queued, retry_delay).await;
            }
        }

        tracing::info!(
            job_id = %record.id,
            provider = %record.provider,
            attempt = queued.attempt,
            "processing generation job"
        );

        let started = Instant::now();
        match self.execute(&record).await {
            Ok(mut outputs) => {
                outputs.processing_ms = started.elapsed().as_millis() as i64;

                if let Err(e) = self.jobs.mark_completed(record.id, &outputs).await {
                    tracing::error!(job_id = %record.id, error = %e, "failed to persist completion");
                    return self.queue.nack(queued, retry_delay).await;
                }

                // Success-only, after the COMPLETED write: a failed job never
                // consumes billable quota.
                if let Err(e) = self
                    .brands
                    .record_generation_usage(
                        record.brand_id,
                        record.id,
                        &record.model,
                        outputs.cost_cents,
                    )
                    .await
                {
                    tracing::error!(job_id = %record.id, error = %e, "usage recording failed");
                }

                metrics::counter!("generation_jobs_completed").increment(1);
                metrics::histogram!("generation_processing_seconds")
                    .record(started.elapsed().as_secs_f64());

                self.events
                    .emit(
                        "generation.completed",
                        json!({
                            "job_id": record.id,
                            "public_id": record.public_id,
                            "image_url": outputs.output_image_url,
                            "duration_ms": outputs.processing_ms,
                        }),
                    )
                    .await;

                tracing::info!(
                    job_id = %record.id,
                    duration_ms = outputs.processing_ms,
                    cost_cents = outputs.cost_cents,
                    "generation job completed"
                );

                self.queue.ack(queued).await
            }
            Err(e) => {
                // Full detail stays server-side; the record gets a generic
                // code and message.
                tracing::error!(
                    job_id = %record.id,
                    error = %e,
                    code = e.code(),
                    attempt = queued.attempt,
                    "generation job failed"
                );

                if let Err(db) = self
                    .jobs
                    .mark_failed(record.id, e.code(), e.public_message())
                    .await
                {
                    tracing::error!(job_id = %record.id, error = %db, "failed to persist failure");
                }
                if let Err(db) = self.jobs.increment_retry(record.id).await {
                    tracing::error!(job_id = %record.id, error = %db, "failed to bump retry count");
                }

                metrics::counter!("generation_jobs_failed").increment(1);

                self.events
                    .emit(
                        "generation.failed",
                        json!({
                            "job_id": record.id,
                            "public_id": record.public_id,
                            "error_code": e.code(),
                        }),
                    )
                    .await;

                self.queue.nack(queued, retry_delay).await
            }
        }
    }

    /// The happy path: everything between PROCESSING and the COMPLETED write.
    async fn execute(&self, record: &GenerationJob) -> Result<JobOutputs, ProcessError> {
        let product = self
            .products
            .get_active_product(record.brand_id, record.product_id)
            .await?
            .ok_or(ProcessError::ProductMissing)?;

        let provider = self.providers.get_by_name(&record.provider);

        let verdict = provider.moderate_prompt(&record.prompt).await?;
        if !verdict.approved {
            let reason = verdict.reason.unwrap_or_else(|| "unspecified".to_string());
            return Err(ProviderError::ModerationBlocked(reason).into());
        }

        let generated = provider
            .generate(&GenerateRequest {
                prompt: record.prompt.clone(),
                negative_prompt: record.negative_prompt.clone(),
                model: record.model.clone(),
                quality: record.quality.clone(),
                width: record.width,
                height: record.height,
            })
            .await?;

        let overlay = match generated.image {
            OverlaySource::Bytes(bytes) => bytes,
            OverlaySource::Url(url) => self
                .storage
                .download(&url)
                .await
                .map_err(ProcessError::OverlayFetch)?,
        };

        // Base image is optional by design: a download failure here degrades
        // to overlay-only output instead of failing the job.
        let base = match &product.base_image_url {
            Some(url) => match self.storage.download(url).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(
                        job_id = %record.id,
                        url = %url,
                        error = %e,
                        "base image download failed, composing without it"
                    );
                    None
                }
            },
            None => None,
        };

        let composed = compose::compose(
            base.as_deref(),
            &overlay,
            &product.zones,
            &record.customizations,
            &record.output_format,
        )?;
        let thumbnail = compose::create_thumbnail(&composed)?;

        // Keys are derived from the job id, so redelivered jobs overwrite
        // their own assets rather than leaving partial state.
        let image_key = format!(
            "generations/{}.{}",
            record.id,
            compose::extension(&record.output_format)
        );
        let thumb_key = format!("generations/{}_thumb.jpg", record.id);

        let output_image_url = self
            .storage
            .upload(
                &composed,
                &image_key,
                compose::content_type(&record.output_format),
            )
            .await
            .map_err(ProcessError::Upload)?;
        let thumbnail_url = self
            .storage
            .upload(&thumbnail, &thumb_key, "image/jpeg")
            .await
            .map_err(ProcessError::Upload)?;

        // AR-enabled products reuse the composed image as the AR texture; the
        // 3-D model itself is regenerated elsewhere.
        let ar_model_url = if product.ar.enabled {
            product.ar.model_3d_url.clone()
        } else {
            None
        };

        Ok(JobOutputs {
            output_image_url,
            thumbnail_url,
            ar_model_url,
            cost_cents: generated.cost_cents,
            tokens_used: generated.tokens_used,
            processing_ms: 0, // set by the caller from its own timer
            provider_metadata: generated.raw,
        })
    }
}
