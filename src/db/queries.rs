use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{JobInput, JobRecord, JobStatus, NewJob, OutputLocation};

const JOB_COLUMNS: &str = "job_id, requested_ts, category, start_date, end_date, status, pending, \
                           output_container, output_key";

/// Map a row into a `JobRecord`, rejecting shapes the table constraints should prevent.
fn job_from_row(row: &PgRow) -> Result<JobRecord, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(e),
    })?;

    let container: Option<String> = row.try_get("output_container")?;
    let key: Option<String> = row.try_get("output_key")?;
    let output = match (container, key) {
        (Some(container), Some(key)) => Some(OutputLocation { container, key }),
        (None, None) => None,
        _ => {
            return Err(sqlx::Error::ColumnDecode {
                index: "output_key".to_string(),
                source: "output container and key must be set together".into(),
            })
        }
    };

    let pending: Option<bool> = row.try_get("pending")?;

    Ok(JobRecord {
        job_id: row.try_get("job_id")?,
        requested_ts: row.try_get("requested_ts")?,
        input: JobInput {
            category: row.try_get("category")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
        },
        status,
        pending: pending.unwrap_or(false),
        output,
    })
}

/// Insert a new pending job
pub async fn create_job(pool: &PgPool, job: &NewJob) -> Result<JobRecord, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO activity_jobs
            (job_id, requested_ts, category, start_date, end_date, status, pending)
        VALUES ($1, $2, $3, $4, $5, 'new', TRUE)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job.job_id)
    .bind(job.requested_ts)
    .bind(&job.input.category)
    .bind(&job.input.start_date)
    .bind(&job.input.end_date)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Claim the oldest pending job.
///
/// The pending flag is cleared and the status set in one statement; a concurrent
/// claimer either skips the locked row or fails the `pending IS TRUE` guard.
pub async fn claim_oldest_pending(pool: &PgPool) -> Result<Option<JobRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE activity_jobs
        SET pending = NULL,
            status = 'in_progress',
            claimed_at = NOW()
        WHERE (job_id, requested_ts) = (
            SELECT job_id, requested_ts
            FROM activity_jobs
            WHERE pending IS TRUE
            ORDER BY requested_ts ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
          AND pending IS TRUE
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Mark a job done and record its artifact location.
///
/// Returns the number of rows updated.
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    requested_ts: chrono::DateTime<chrono::Utc>,
    output: &OutputLocation,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE activity_jobs
        SET status = 'done',
            output_container = $3,
            output_key = $4,
            completed_at = NOW()
        WHERE job_id = $1 AND requested_ts = $2
        "#,
    )
    .bind(job_id)
    .bind(requested_ts)
    .bind(&output.container)
    .bind(&output.key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Get every record sharing a job ID (more than one means the table is corrupt)
pub async fn find_jobs_by_id(pool: &PgPool, job_id: Uuid) -> Result<Vec<JobRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM activity_jobs
        WHERE job_id = $1
        "#
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Count jobs still waiting to be claimed
pub async fn count_pending_jobs(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS pending FROM activity_jobs WHERE pending IS TRUE")
        .fetch_one(pool)
        .await?;

    row.try_get("pending")
}
