use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::job::{OutputLocation, DATE_FORMAT};
use crate::services::storage::{BlobStore, StorageError};

const ARTIFACT_PREFIX: &str = "daily_activity";
const CSV_HEADER: &str = "date,activity";

/// One planned day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    pub date: NaiveDate,
    /// Empty when no recommendation was available for the day.
    pub activity: String,
}

/// Deterministic artifact key for a job; republishing overwrites it.
pub fn artifact_key(job_id: Uuid) -> String {
    format!("{}/{}.csv", ARTIFACT_PREFIX, job_id)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render rows as `date,activity` CSV in the order given.
pub fn render_csv(rows: &[ActivityRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + rows.len() * 24);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.date.format(DATE_FORMAT).to_string());
        out.push(',');
        out.push_str(&csv_field(&row.activity));
        out.push('\n');
    }
    out
}

/// Writes planned activities to blob storage.
pub struct ResultPublisher {
    storage: Arc<dyn BlobStore>,
}

impl ResultPublisher {
    pub fn new(storage: Arc<dyn BlobStore>) -> Self {
        Self { storage }
    }

    /// Publish a job's rows and return the exact location written.
    pub async fn publish(
        &self,
        rows: &[ActivityRow],
        job_id: Uuid,
    ) -> Result<OutputLocation, PublishError> {
        let key = artifact_key(job_id);
        let body = render_csv(rows);

        self.storage
            .put(&key, body.as_bytes(), "text/csv")
            .await
            .map_err(|source| PublishError::Storage {
                key: key.clone(),
                source,
            })?;

        tracing::info!(job_id = %job_id, key = %key, rows = rows.len(), "Published activity plan");

        Ok(OutputLocation {
            container: self.storage.container().to_string(),
            key,
        })
    }

    /// Fetch a published artifact.
    pub async fn fetch(&self, location: &OutputLocation) -> Result<Vec<u8>, PublishError> {
        if location.container != self.storage.container() {
            return Err(PublishError::ForeignContainer(location.container.clone()));
        }
        self.storage
            .get(&location.key)
            .await
            .map_err(|source| PublishError::Storage {
                key: location.key.clone(),
                source,
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to write artifact {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Artifact lives in container {0}, which this publisher does not serve")]
    ForeignContainer(String),
}
