use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{JobStatusResponse, SubmitJobRequest, SubmitJobResponse};
use crate::models::job::{JobInput, JobRecord, JobStatus, NewJob};
use crate::services::job_store::{JobLookup, JobStore};
use crate::services::launcher;

/// POST /api/v1/jobs: Submit a daily activity planning job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, StatusCode> {
    request.validate().map_err(|e| {
        tracing::debug!(error = %e, "Rejected job submission");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let input = JobInput {
        category: request.category,
        start_date: request.start_date,
        end_date: request.end_date,
    };

    let (start, end) = input.date_range().map_err(|_| StatusCode::BAD_REQUEST)?;
    if end <= start {
        return Err(StatusCode::BAD_REQUEST);
    }
    let days = (end - start).num_days();

    let record = state
        .jobs
        .submit(NewJob::new(input))
        .await
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    metrics::counter!("activity_jobs_submitted_total").increment(1);
    tracing::info!(job_id = %record.job_id, days, "Planning job accepted");

    let trigger = Arc::clone(&state.launcher);
    tokio::spawn(async move {
        launcher::ensure_worker(trigger.as_ref()).await;
    });

    Ok(Json(SubmitJobResponse {
        job_id: record.job_id,
        status: record.status,
        days,
    }))
}

fn found_job(lookup: JobLookup) -> Result<JobRecord, StatusCode> {
    match lookup {
        JobLookup::Found(record) => Ok(record),
        JobLookup::NotFound => Err(StatusCode::NOT_FOUND),
        JobLookup::Corrupt { .. } => Err(StatusCode::INTERNAL_SERVER_ERROR),
        JobLookup::Unavailable => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// GET /api/v1/jobs/{job_id}: Check job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let record = found_job(state.jobs.lookup(job_id).await)?;

    Ok(Json(JobStatusResponse {
        job_id: record.job_id,
        status: record.status,
        output: record.output,
    }))
}

/// GET /api/v1/jobs/{job_id}/artifact: Download the CSV of a finished job.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let record = found_job(state.jobs.lookup(job_id).await)?;

    let location = match (record.status, record.output) {
        (JobStatus::Done, Some(location)) => location,
        (JobStatus::Done, None) => {
            tracing::error!(job_id = %job_id, "Done job has no output location");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        _ => return Err(StatusCode::CONFLICT),
    };

    let body = state.publisher.fetch(&location).await.map_err(|e| {
        tracing::error!(
            job_id = %job_id,
            key = %location.key,
            error = %e,
            "Failed to download artifact"
        );
        StatusCode::BAD_GATEWAY
    })?;

    Ok(([(header::CONTENT_TYPE, "text/csv")], body))
}
