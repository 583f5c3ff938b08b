//! Test helper utilities shared by the integration and E2E tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use activity_planner::{
    app_state::AppState,
    services::{
        engine::{InMemoryFrequencyStore, RecommendationEngine},
        job_store::InMemoryJobStore,
        launcher::{LaunchError, LaunchTrigger},
        publisher::ResultPublisher,
        storage::InMemoryBlobStore,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use uuid::Uuid;

pub const TEST_CONTAINER: &str = "activity-results";

/// Launch trigger that only counts launch requests.
#[derive(Default)]
pub struct CountingLauncher {
    pub running: bool,
    pub starts: AtomicU32,
}

impl CountingLauncher {
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LaunchTrigger for CountingLauncher {
    async fn is_worker_running(&self) -> Result<bool, LaunchError> {
        Ok(self.running)
    }

    async fn start_worker(&self) -> Result<(), LaunchError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fully in-memory system: job store, frequency table, blob store, launcher.
pub struct InMemorySystem {
    pub jobs: Arc<InMemoryJobStore>,
    pub frequencies: Arc<InMemoryFrequencyStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub launcher: Arc<CountingLauncher>,
    pub engine: Arc<RecommendationEngine>,
}

impl InMemorySystem {
    pub fn new(frequencies: InMemoryFrequencyStore) -> Self {
        let frequencies = Arc::new(frequencies);
        Self {
            jobs: Arc::new(InMemoryJobStore::new()),
            engine: Arc::new(RecommendationEngine::with_seed(frequencies.clone(), 42)),
            frequencies,
            blobs: Arc::new(InMemoryBlobStore::new(TEST_CONTAINER)),
            launcher: Arc::new(CountingLauncher::default()),
        }
    }

    pub fn publisher(&self) -> ResultPublisher {
        ResultPublisher::new(self.blobs.clone())
    }

    /// Route state sharing this system's stores.
    pub fn app_state(&self) -> AppState {
        AppState {
            jobs: self.jobs.clone(),
            engine: self.engine.clone(),
            publisher: Arc::new(self.publisher()),
            launcher: self.launcher.clone(),
        }
    }
}

/// Response from POST /api/v1/jobs
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub days: i64,
}

/// Response from GET /api/v1/jobs/{job_id}
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub output: Option<serde_json::Value>,
}

/// Submit a planning job to a running server
pub async fn submit_job(
    client: &reqwest::Client,
    base_url: &str,
    category: &str,
    start_date: &str,
    end_date: &str,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .json(&serde_json::json!({
            "category": category,
            "start_date": start_date,
            "end_date": end_date,
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Poll job status until done (with timeout)
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<JobStatusResponse>().await?;

        match status_response.status.as_str() {
            "done" => return Ok(status_response),
            "new" | "in_progress" => {
                if attempt % 10 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                sleep(Duration::from_millis(500)).await;
            }
            _ => {
                return Err(format!("Unknown job status: {}", status_response.status).into());
            }
        }
    }

    Err(format!("Job did not complete within {} seconds", timeout_secs).into())
}

/// Split a `date,activity` artifact into rows, checking the header
pub fn parse_artifact(body: &str) -> Vec<(String, String)> {
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("date,activity"), "artifact header");
    lines
        .map(|line| {
            let (date, activity) = line.split_once(',').expect("row has two fields");
            (date.to_string(), activity.to_string())
        })
        .collect()
}
