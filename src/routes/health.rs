use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    /// Jobs waiting across all priority classes; absent when Redis is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_jobs: Option<u64>,
}

/// GET /health — dependency status plus the queue's current backlog.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    // Check database connectivity
    let db_check = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(_) => ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        },
    };

    // The depth query doubles as the Redis connectivity probe.
    let queue_start = std::time::Instant::now();
    let queue_check = match state.queue.queue_depth().await {
        Ok(depth) => QueueHealth {
            status: "ok".to_string(),
            latency_ms: Some(queue_start.elapsed().as_millis() as u64),
            pending_jobs: Some(depth),
        },
        Err(_) => QueueHealth {
            status: "error".to_string(),
            latency_ms: None,
            pending_jobs: None,
        },
    };

    let all_healthy = db_check.status == "ok" && queue_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            queue: queue_check,
        },
    };

    (status_code, Json(response))
}
