use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status of a generation job in the async pipeline.
///
/// Forward-only: `Pending -> Processing -> Completed | Failed`. `Completed` is
/// terminal; a `Failed` job may re-enter `Processing` when the queue redelivers
/// it, but never returns to `Pending`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Value supplied by the end customer for one customization zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomizationValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl CustomizationValue {
    /// A value with no usable content counts as "not supplied" for required-zone
    /// validation.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty)
            && self.color.as_deref().is_none_or(str::is_empty)
            && self.pattern.as_deref().is_none_or(str::is_empty)
    }
}

/// Zone id -> supplied value. BTreeMap so serialized payloads (and the prompts
/// built from them) are deterministic across retries.
pub type CustomizationMap = BTreeMap<String, CustomizationValue>;

/// A generation job: the durable record of one customization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    /// Opaque, shareable id used by untrusted clients.
    pub public_id: String,
    pub brand_id: Uuid,
    pub product_id: Uuid,

    pub customizations: CustomizationMap,
    pub user_hint: Option<String>,
    pub session_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,

    /// Written once by the orchestrator before enqueue, never mutated after.
    pub prompt: String,
    pub negative_prompt: String,

    pub provider: String,
    pub model: String,
    pub quality: String,
    pub output_format: String,
    pub width: u32,
    pub height: u32,

    pub status: JobStatus,
    pub tokens_used: Option<i32>,
    pub cost_cents: Option<i32>,
    pub processing_ms: Option<i64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: i32,
    pub ar_view_count: i32,
    pub viewed_in_ar: bool,

    pub output_image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub ar_model_url: Option<String>,
    pub provider_metadata: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Jobs that never completed within their expiry horizon are considered
    /// abandoned and excluded from default listings.
    pub fn is_abandoned(&self, now: DateTime<Utc>) -> bool {
        self.status != JobStatus::Completed && now > self.expires_at
    }
}

/// Outputs written on successful completion.
#[derive(Debug, Clone)]
pub struct JobOutputs {
    pub output_image_url: String,
    pub thumbnail_url: String,
    pub ar_model_url: Option<String>,
    pub cost_cents: i32,
    pub tokens_used: Option<i32>,
    pub processing_ms: i64,
    pub provider_metadata: serde_json::Value,
}

/// Write-once inputs captured at creation.
#[derive(Debug, Clone)]
pub struct NewGenerationJob {
    pub brand_id: Uuid,
    pub product_id: Uuid,
    pub customizations: CustomizationMap,
    pub user_hint: Option<String>,
    pub session_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub provider: String,
    pub model: String,
    pub quality: String,
    pub output_format: String,
    pub width: u32,
    pub height: u32,
}

impl NewGenerationJob {
    pub fn generate_public_id() -> String {
        format!("gen_{}", Uuid::new_v4().simple())
    }
}

/// Payload serialized onto the queue. Carries only the reference to the durable
/// record plus delivery bookkeeping; the record itself is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: Uuid,
    /// Lower value dequeues first (enterprise 0 .. free 3).
    pub priority: u8,
    /// Delivery attempts so far; incremented by the queue on nack.
    pub attempt: u32,
}
