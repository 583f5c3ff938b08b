use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Date format used for job inputs and artifact rows.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Status of an activity planning job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    New,
    InProgress,
    Done,
}

/// Blob storage location of a published artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputLocation {
    pub container: String,
    pub key: String,
}

/// Requester inputs, stored verbatim so the worker decides whether the dates parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobInput {
    pub category: String,
    pub start_date: String,
    pub end_date: String,
}

impl JobInput {
    /// Parse the requested `[start, end)` range.
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate), chrono::ParseError> {
        let start = NaiveDate::parse_from_str(&self.start_date, DATE_FORMAT)?;
        let end = NaiveDate::parse_from_str(&self.end_date, DATE_FORMAT)?;
        Ok((start, end))
    }
}

/// A new job as written by the submission path.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: Uuid,
    pub requested_ts: DateTime<Utc>,
    pub input: JobInput,
}

impl NewJob {
    pub fn new(input: JobInput) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            requested_ts: Utc::now(),
            input,
        }
    }
}

/// A job record keyed by `(job_id, requested_ts)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub requested_ts: DateTime<Utc>,
    pub input: JobInput,
    pub status: JobStatus,
    /// Only set while `status` is `New`; cleared by the claim.
    pub pending: bool,
    pub output: Option<OutputLocation>,
}

impl JobRecord {
    pub fn from_new(job: NewJob) -> Self {
        Self {
            job_id: job.job_id,
            requested_ts: job.requested_ts,
            input: job.input,
            status: JobStatus::New,
            pending: true,
            output: None,
        }
    }
}
