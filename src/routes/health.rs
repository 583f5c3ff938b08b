use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::{job_store::JobStore, launcher::LaunchTrigger};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
    /// Jobs waiting for a worker
    pub pending_jobs: Option<u64>,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
    pub launcher: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn from_check(ok: bool, start: std::time::Instant) -> Self {
        if ok {
            Self {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            }
        } else {
            Self {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    }
}

/// GET /health: health check with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let job_store = ComponentHealth::from_check(state.jobs.health_check().await, start);

    let launcher_start = std::time::Instant::now();
    let launcher_ok = state.launcher.health_check().await.is_ok();
    let launcher = ComponentHealth::from_check(launcher_ok, launcher_start);

    let pending_jobs = state.jobs.pending_count().await;
    if let Some(pending) = pending_jobs {
        metrics::gauge!("activity_jobs_pending").set(pending as f64);
    }

    let all_healthy = job_store.status == "ok" && launcher.status == "ok";
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
        checks: HealthChecks { job_store, launcher },
        pending_jobs,
    };

    (status_code, Json(response))
}
