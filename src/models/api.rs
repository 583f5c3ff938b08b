use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobStatus, OutputLocation};

/// Request to plan daily activities for a date range.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[garde(length(min = 1, max = 100))]
    pub category: String,

    /// Inclusive start date, `YYYY-MM-DD`.
    #[garde(length(min = 10, max = 10))]
    pub start_date: String,

    /// Exclusive end date, `YYYY-MM-DD`.
    #[garde(length(min = 10, max = 10))]
    pub end_date: String,
}

/// Response after submitting a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub days: i64,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub output: Option<OutputLocation>,
}
