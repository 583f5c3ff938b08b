//! Durable job table access.
//!
//! Every backend call is single-attempt. Failures are logged and surface as
//! `None`, `false` or [`JobLookup::Unavailable`]; they never unwind into the
//! worker loop.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::job::{JobRecord, JobStatus, NewJob, OutputLocation};

/// Result of looking a job up by its identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum JobLookup {
    NotFound,
    Found(JobRecord),
    /// More than one record shares the identifier. Reported, never repaired.
    Corrupt { count: usize },
    /// The backend call itself failed.
    Unavailable,
}

impl JobLookup {
    fn from_records(job_id: Uuid, mut records: Vec<JobRecord>) -> Self {
        match records.len() {
            0 => {
                tracing::warn!(job_id = %job_id, "No job found");
                JobLookup::NotFound
            }
            1 => JobLookup::Found(records.remove(0)),
            count => {
                tracing::error!(
                    job_id = %job_id,
                    count,
                    "Multiple records share one job id; job store is corrupt"
                );
                JobLookup::Corrupt { count }
            }
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new job with status `New` and the pending flag set.
    async fn submit(&self, job: NewJob) -> Option<JobRecord>;

    /// Atomically claim the oldest pending job, moving it to `InProgress`.
    async fn claim_one_pending(&self) -> Option<JobRecord>;

    /// Mark a claimed job `Done` with its artifact location.
    async fn complete(
        &self,
        job_id: Uuid,
        requested_ts: DateTime<Utc>,
        output: &OutputLocation,
    ) -> bool;

    async fn lookup(&self, job_id: Uuid) -> JobLookup;

    /// Number of jobs waiting to be claimed; `None` when the backend cannot tell.
    async fn pending_count(&self) -> Option<u64> {
        None
    }

    /// Backend reachability, for health checks.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Postgres-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn submit(&self, job: NewJob) -> Option<JobRecord> {
        match queries::create_job(&self.pool, &job).await {
            Ok(record) => {
                tracing::info!(
                    job_id = %record.job_id,
                    category = %record.input.category,
                    "Job submitted"
                );
                Some(record)
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Failed to submit job");
                None
            }
        }
    }

    async fn claim_one_pending(&self) -> Option<JobRecord> {
        match queries::claim_oldest_pending(&self.pool).await {
            Ok(Some(record)) => {
                tracing::info!(
                    job_id = %record.job_id,
                    requested_ts = %record.requested_ts,
                    "Claimed pending job"
                );
                Some(record)
            }
            Ok(None) => {
                tracing::debug!("No pending jobs");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim pending job");
                None
            }
        }
    }

    async fn complete(
        &self,
        job_id: Uuid,
        requested_ts: DateTime<Utc>,
        output: &OutputLocation,
    ) -> bool {
        match queries::complete_job(&self.pool, job_id, requested_ts, output).await {
            Ok(1) => {
                tracing::info!(job_id = %job_id, key = %output.key, "Job marked done");
                true
            }
            Ok(rows) => {
                tracing::error!(
                    job_id = %job_id,
                    rows,
                    "Job completion matched an unexpected number of rows"
                );
                false
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job completion update failed");
                false
            }
        }
    }

    async fn lookup(&self, job_id: Uuid) -> JobLookup {
        match queries::find_jobs_by_id(&self.pool, job_id).await {
            Ok(records) => JobLookup::from_records(job_id, records),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to look up job");
                JobLookup::Unavailable
            }
        }
    }

    async fn pending_count(&self) -> Option<u64> {
        match queries::count_pending_jobs(&self.pool).await {
            Ok(count) => u64::try_from(count).ok(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to count pending jobs");
                None
            }
        }
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Process-local job store. The claim runs inside a single critical section.
#[derive(Default)]
pub struct InMemoryJobStore {
    records: Mutex<Vec<JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing the submission path.
    pub fn insert_record(&self, record: JobRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    pub fn records(&self) -> Vec<JobRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn submit(&self, job: NewJob) -> Option<JobRecord> {
        let record = JobRecord::from_new(job);
        let mut records = self.records.lock().ok()?;
        if records
            .iter()
            .any(|r| r.job_id == record.job_id && r.requested_ts == record.requested_ts)
        {
            tracing::error!(job_id = %record.job_id, "Duplicate job key");
            return None;
        }
        records.push(record.clone());
        Some(record)
    }

    async fn claim_one_pending(&self) -> Option<JobRecord> {
        let mut records = self.records.lock().ok()?;
        let record = records
            .iter_mut()
            .filter(|r| r.pending)
            .min_by_key(|r| r.requested_ts)?;
        record.pending = false;
        record.status = JobStatus::InProgress;
        Some(record.clone())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        requested_ts: DateTime<Utc>,
        output: &OutputLocation,
    ) -> bool {
        let Ok(mut records) = self.records.lock() else {
            return false;
        };
        match records
            .iter_mut()
            .find(|r| r.job_id == job_id && r.requested_ts == requested_ts)
        {
            Some(record) => {
                record.status = JobStatus::Done;
                record.output = Some(output.clone());
                true
            }
            None => {
                tracing::error!(job_id = %job_id, "Cannot complete unknown job");
                false
            }
        }
    }

    async fn lookup(&self, job_id: Uuid) -> JobLookup {
        let matching = match self.records.lock() {
            Ok(records) => records.iter().filter(|r| r.job_id == job_id).cloned().collect(),
            Err(_) => return JobLookup::Unavailable,
        };
        JobLookup::from_records(job_id, matching)
    }

    async fn pending_count(&self) -> Option<u64> {
        let records = self.records.lock().ok()?;
        Some(records.iter().filter(|r| r.pending).count() as u64)
    }
}
