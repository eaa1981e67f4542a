use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures surfaced synchronously at request-creation time. These never reach
/// the queue.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("product not found or inactive")]
    NotFound,

    #[error("validation failed for zone '{zone}': {reason}")]
    ValidationFailed { zone: String, reason: String },

    #[error("monthly generation quota exceeded")]
    QuotaExceeded,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(#[from] crate::services::queue::QueueError),
}

impl IntoResponse for CreateError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            CreateError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CreateError::ValidationFailed { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED")
            }
            CreateError::QuotaExceeded => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
            CreateError::Database(_) | CreateError::Queue(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };

        // Internal failures are logged server-side, not echoed to clients.
        let message = match &self {
            CreateError::Database(e) => {
                tracing::error!(error = %e, "database error during create");
                "internal error".to_string()
            }
            CreateError::Queue(e) => {
                tracing::error!(error = %e, "queue error during create");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

/// Failures inside the worker. Recorded on the job (FAILED) rather than
/// propagated to any caller; the queue's retry policy decides redelivery.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("product no longer available")]
    ProductMissing,

    #[error("provider error: {0}")]
    Provider(#[from] crate::services::providers::ProviderError),

    #[error("failed to fetch overlay image: {0}")]
    OverlayFetch(crate::services::storage::StorageError),

    #[error("composition failed: {0}")]
    Composition(#[from] crate::services::compose::ComposeError),

    #[error("upload failed: {0}")]
    Upload(crate::services::storage::StorageError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ProcessError {
    /// Stable code persisted on the job record. Provider detail stays in the
    /// server logs so third-party internals are not echoed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::ProductMissing => "PRODUCT_UNAVAILABLE",
            ProcessError::Provider(_) | ProcessError::OverlayFetch(_) => "PROVIDER_ERROR",
            ProcessError::Composition(_) => "COMPOSITION_FAILED",
            ProcessError::Upload(_) => "UPLOAD_FAILED",
            ProcessError::Database(_) => "INTERNAL",
        }
    }

    /// Generic client-safe message for the job record.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProcessError::ProductMissing => "product is no longer available",
            ProcessError::Provider(_) | ProcessError::OverlayFetch(_) => {
                "image generation failed"
            }
            ProcessError::Composition(_) => "image composition failed",
            ProcessError::Upload(_) => "asset upload failed",
            ProcessError::Database(_) => "internal error",
        }
    }
}
