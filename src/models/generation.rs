use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{CustomizationMap, GenerationJob, JobStatus};
use crate::models::product::ArConfig;

/// Request to start a generation (body of POST /api/v1/generations).
///
/// Zone-level constraints (required zones, max lengths) are data-driven and
/// checked by the orchestrator against the product's configured zones.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGenerationRequest {
    #[garde(skip)]
    pub brand_id: Uuid,

    #[garde(skip)]
    pub product_id: Uuid,

    #[garde(skip)]
    #[serde(default)]
    pub customizations: CustomizationMap,

    #[garde(inner(length(max = 500)))]
    pub user_hint: Option<String>,

    #[garde(inner(length(min = 1, max = 128)))]
    pub session_id: Option<String>,
}

/// Response after a request is accepted.
#[derive(Debug, Serialize)]
pub struct CreateGenerationResponse {
    pub public_id: String,
    pub status: JobStatus,
    pub estimated_seconds: u32,
    pub status_url: String,
}

/// Output URLs, present only once a job has completed.
#[derive(Debug, Serialize)]
pub struct GenerationResult {
    pub image_url: String,
    pub thumbnail_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ar_model_url: Option<String>,
}

/// Response for the status poll endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub public_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn from_job(job: &GenerationJob) -> Self {
        let result = match (&job.output_image_url, &job.thumbnail_url) {
            (Some(image_url), Some(thumbnail_url)) if job.status == JobStatus::Completed => {
                Some(GenerationResult {
                    image_url: image_url.clone(),
                    thumbnail_url: thumbnail_url.clone(),
                    ar_model_url: job.ar_model_url.clone(),
                })
            }
            _ => None,
        };
        Self {
            public_id: job.public_id.clone(),
            status: job.status,
            result,
            error: job.error_message.clone(),
        }
    }
}

/// Product summary embedded in the full job projection.
#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub category: String,
}

/// Full projection of a job, for the detail endpoint.
#[derive(Debug, Serialize)]
pub struct GenerationProjection {
    pub public_id: String,
    pub status: JobStatus,
    /// Absent if the product has since been deactivated or deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSummary>,
    pub customizations: CustomizationMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: i32,
    pub ar_view_count: i32,
    pub viewed_in_ar: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ar: Option<ArConfig>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// AR payload returned by the AR endpoint. Reading it counts as an AR view.
#[derive(Debug, Serialize)]
pub struct ArDataResponse {
    pub texture_url: String,
    pub model_url: String,
    pub tracking_type: String,
    pub scale: f64,
    pub offset: [f64; 3],
}
