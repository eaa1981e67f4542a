use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::generation::{
    ArDataResponse, CreateGenerationRequest, GenerationProjection, GenerationResult,
    ProductSummary, StatusResponse,
};
use crate::models::job::JobStatus;
use crate::services::orchestrator::RequestMeta;

/// POST /api/v1/generations — accept a customization request.
pub async fn submit_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateGenerationRequest>,
) -> Response {
    if let Err(report) = request.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "VALIDATION_FAILED", "message": report.to_string() })),
        )
            .into_response();
    }

    let meta = request_meta(&headers);
    match state.orchestrator.create(request, meta).await {
        Ok(response) => (StatusCode::ACCEPTED, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/generations/{public_id}/status — poll for completion.
pub async fn get_status(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let job = state
        .jobs
        .get_by_public_id(&public_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(StatusResponse::from_job(&job)))
}

/// GET /api/v1/generations/{public_id} — full projection.
pub async fn get_generation(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<GenerationProjection>, StatusCode> {
    let job = state
        .jobs
        .get_by_public_id(&public_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let product = state
        .products
        .get_active_product(job.brand_id, job.product_id)
        .await
        .map_err(internal)?;

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

    Ok(Json(GenerationProjection {
        public_id: job.public_id,
        status: job.status,
        product: product.as_ref().map(|p| ProductSummary {
            id: p.id,
            name: p.name.clone(),
            category: p.category.clone(),
        }),
        customizations: job.customizations,
        result,
        error: job.error_message,
        retry_count: job.retry_count,
        ar_view_count: job.ar_view_count,
        viewed_in_ar: job.viewed_in_ar,
        ar: product.map(|p| p.ar),
        created_at: job.created_at,
        completed_at: job.completed_at,
    }))
}

/// GET /api/v1/generations/{public_id}/ar — AR payload.
///
/// Reading this counts as an AR view and increments the job's counter.
pub async fn get_ar_data(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<ArDataResponse>, StatusCode> {
    let job = state
        .jobs
        .get_by_public_id(&public_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let texture_url = match (&job.status, &job.output_image_url) {
        (JobStatus::Completed, Some(url)) => url.clone(),
        _ => return Err(StatusCode::NOT_FOUND),
    };

    let product = state
        .products
        .get_active_product(job.brand_id, job.product_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let model_url = match (&product.ar.enabled, &product.ar.model_3d_url) {
        (true, Some(url)) => url.clone(),
        _ => return Err(StatusCode::NOT_FOUND),
    };

    if let Err(e) = state.jobs.increment_ar_views(&public_id).await {
        // View tracking is best-effort; the payload still goes out.
        tracing::warn!(public_id = %public_id, error = %e, "failed to record AR view");
    }

    Ok(Json(ArDataResponse {
        texture_url,
        model_url,
        tracking_type: product.ar.tracking_type,
        scale: product.ar.scale,
        offset: product.ar.offset,
    }))
}

/// GET /api/v1/brands/{brand_id}/generations — recent jobs for a brand,
/// excluding abandoned requests.
pub async fn list_brand_generations(
    State(state): State<AppState>,
    Path(brand_id): Path<Uuid>,
) -> Result<Json<Vec<StatusResponse>>, StatusCode> {
    let jobs = state
        .jobs
        .list_recent_for_brand(brand_id, 50)
        .await
        .map_err(internal)?;

    Ok(Json(jobs.iter().map(StatusResponse::from_job).collect()))
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    RequestMeta {
        client_ip: header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string()),
        user_agent: header("user-agent"),
        referrer: header("referer"),
    }
}

fn internal(e: sqlx::Error) -> StatusCode {
    tracing::error!(error = %e, "database error serving generation route");
    StatusCode::INTERNAL_SERVER_ERROR
}
