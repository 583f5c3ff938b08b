//! Job processing loop.
//!
//! One job at a time: claim, plan each day, publish, complete. A job whose
//! dates do not parse, or whose completion update fails, is left in
//! `InProgress`; nothing in this loop reclaims it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::job::{JobRecord, OutputLocation};
use crate::services::job_store::JobStore;
use crate::services::publisher::{ActivityRow, ResultPublisher};
use crate::services::recommender::Recommender;

/// Polling schedule of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls that found no job.
    pub interval: Duration,
    /// Stop after this many poll cycles; `None` runs forever.
    pub max_iterations: Option<u64>,
}

impl PollPolicy {
    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            max_iterations: None,
        }
    }
}

/// Liveness signal of a busy worker.
///
/// Called at the top of every poll cycle and again before each planned day, so a
/// long job keeps the signal fresh.
#[async_trait]
pub trait Heartbeat: Send + Sync {
    async fn beat(&self);
}

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(OutputLocation),
    /// Dates did not parse; the job stays `InProgress`.
    Abandoned,
    /// Artifact write failed; the job stays `InProgress`.
    PublishFailed,
    /// Artifact written but the job record was not updated.
    CompletionFailed(OutputLocation),
}

/// Result of a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Processed(JobOutcome),
}

/// Every calendar day in `[start, end)`.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day < end)
}

pub struct JobWorker {
    store: Arc<dyn JobStore>,
    recommender: Arc<dyn Recommender>,
    publisher: ResultPublisher,
    policy: PollPolicy,
    heartbeat: Option<Arc<dyn Heartbeat>>,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        recommender: Arc<dyn Recommender>,
        publisher: ResultPublisher,
        policy: PollPolicy,
    ) -> Self {
        Self {
            store,
            recommender,
            publisher,
            policy,
            heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Arc<dyn Heartbeat>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    async fn beat(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.beat().await;
        }
    }

    /// Run the polling loop until the policy's iteration cap, if any.
    /// Returns the number of jobs claimed.
    pub async fn run(&self) -> u64 {
        let mut iterations = 0;
        let mut processed = 0;
        loop {
            if let Some(max) = self.policy.max_iterations {
                if iterations >= max {
                    break;
                }
            }
            iterations += 1;

            self.beat().await;
            match self.poll_once().await {
                PollOutcome::Processed(outcome) => {
                    processed += 1;
                    tracing::debug!(?outcome, "Job processed, checking for next job");
                }
                PollOutcome::Idle => {
                    tracing::trace!(
                        interval_secs = self.policy.interval.as_secs(),
                        "No jobs available, sleeping"
                    );
                    tokio::time::sleep(self.policy.interval).await;
                }
            }
        }
        processed
    }

    /// Claim and process at most one job.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.store.claim_one_pending().await {
            Some(job) => PollOutcome::Processed(self.process(job).await),
            None => PollOutcome::Idle,
        }
    }

    async fn process(&self, job: JobRecord) -> JobOutcome {
        let started = Instant::now();
        tracing::info!(
            job_id = %job.job_id,
            category = %job.input.category,
            start_date = %job.input.start_date,
            end_date = %job.input.end_date,
            "Processing activity planning job"
        );

        let (start, end) = match job.input.date_range() {
            Ok(range) => range,
            Err(e) => {
                tracing::error!(
                    job_id = %job.job_id,
                    start_date = %job.input.start_date,
                    end_date = %job.input.end_date,
                    error = %e,
                    "Cannot parse job dates, abandoning job in progress"
                );
                metrics::counter!("activity_jobs_abandoned_total").increment(1);
                return JobOutcome::Abandoned;
            }
        };

        let rows = self.plan_days(&job.input.category, start, end).await;

        let location = match self.publisher.publish(&rows, job.job_id).await {
            Ok(location) => location,
            Err(e) => {
                tracing::error!(
                    job_id = %job.job_id,
                    error = %e,
                    "Failed to publish activity plan"
                );
                return JobOutcome::PublishFailed;
            }
        };

        let outcome = if self
            .store
            .complete(job.job_id, job.requested_ts, &location)
            .await
        {
            metrics::counter!("activity_jobs_completed_total").increment(1);
            JobOutcome::Completed(location)
        } else {
            tracing::error!(
                job_id = %job.job_id,
                key = %location.key,
                "Job published but not marked done"
            );
            JobOutcome::CompletionFailed(location)
        };

        let elapsed = started.elapsed();
        metrics::histogram!("activity_job_processing_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            job_id = %job.job_id,
            days = rows.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Finished job"
        );
        outcome
    }

    /// One recommendation per day, with no past activity fed back in.
    async fn plan_days(
        &self,
        category: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<ActivityRow> {
        let mut rows = Vec::new();
        for date in days_in_range(start, end) {
            self.beat().await;
            let recommendation = self.recommender.recommend(category, "").await;
            if recommendation.is_empty() {
                tracing::warn!(date = %date, category = %category, "No recommendation available");
            }
            rows.push(ActivityRow {
                date,
                activity: recommendation.chosen_outcome,
            });
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobInput, JobStatus, NewJob};
    use crate::models::recommendation::Recommendation;
    use crate::services::job_store::{InMemoryJobStore, JobLookup};
    use crate::services::storage::{BlobStore, InMemoryBlobStore, StorageError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Records calls and answers with a fixed activity.
    struct ScriptedRecommender {
        calls: Mutex<Vec<(String, String)>>,
        answer: String,
    }

    impl ScriptedRecommender {
        fn new(answer: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: answer.to_string(),
            }
        }
    }

    #[async_trait]
    impl Recommender for ScriptedRecommender {
        async fn recommend(&self, category: &str, prior_outcome: &str) -> Recommendation {
            self.calls
                .lock()
                .unwrap()
                .push((category.to_string(), prior_outcome.to_string()));
            Recommendation {
                candidate_set: vec![self.answer.clone()],
                chosen_outcome: self.answer.clone(),
            }
        }
    }

    struct BrokenBlobStore {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl BlobStore for BrokenBlobStore {
        fn container(&self) -> &str {
            "broken"
        }

        async fn put(
            &self,
            _key: &str,
            _data: &[u8],
            _content_type: &str,
        ) -> Result<(), StorageError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Status { code: 503 })
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NotFound(key.to_string()))
        }
    }

    fn job(start: &str, end: &str) -> NewJob {
        NewJob::new(JobInput {
            category: "male".to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
        })
    }

    fn test_policy(max_iterations: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_iterations: Some(max_iterations),
        }
    }

    /// Job store whose completion update always misses.
    struct StaleCompletionStore {
        inner: InMemoryJobStore,
        completions: AtomicU32,
    }

    #[async_trait]
    impl JobStore for StaleCompletionStore {
        async fn submit(&self, job: NewJob) -> Option<JobRecord> {
            self.inner.submit(job).await
        }

        async fn claim_one_pending(&self) -> Option<JobRecord> {
            self.inner.claim_one_pending().await
        }

        async fn complete(
            &self,
            _job_id: uuid::Uuid,
            _requested_ts: chrono::DateTime<chrono::Utc>,
            _output: &OutputLocation,
        ) -> bool {
            self.completions.fetch_add(1, Ordering::SeqCst);
            false
        }

        async fn lookup(&self, job_id: uuid::Uuid) -> JobLookup {
            self.inner.lookup(job_id).await
        }
    }

    #[derive(Default)]
    struct CountingHeartbeat {
        beats: AtomicU32,
    }

    #[async_trait]
    impl Heartbeat for CountingHeartbeat {
        async fn beat(&self) {
            self.beats.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn worker(
        store: Arc<dyn JobStore>,
        recommender: Arc<ScriptedRecommender>,
        blobs: Arc<dyn BlobStore>,
    ) -> JobWorker {
        JobWorker::new(store, recommender, ResultPublisher::new(blobs), test_policy(3))
    }

    #[test]
    fn test_days_in_range_is_end_exclusive() {
        let start = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 2, 4).unwrap();
        let days: Vec<String> = days_in_range(start, end).map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2020-02-01", "2020-02-02", "2020-02-03"]);
    }

    #[test]
    fn test_days_in_range_empty_when_end_not_after_start() {
        let day = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();
        assert_eq!(days_in_range(day, day).count(), 0);
        assert_eq!(days_in_range(day, day.pred_opt().unwrap()).count(), 0);
    }

    #[tokio::test]
    async fn test_idle_when_nothing_pending() {
        let store = Arc::new(InMemoryJobStore::new());
        let worker = worker(
            store,
            Arc::new(ScriptedRecommender::new("swimming")),
            Arc::new(InMemoryBlobStore::new("activity-results")),
        );
        assert_eq!(worker.poll_once().await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_processes_one_row_per_day() {
        let store = Arc::new(InMemoryJobStore::new());
        let recommender = Arc::new(ScriptedRecommender::new("swimming"));
        let blobs = Arc::new(InMemoryBlobStore::new("activity-results"));
        let record = store.submit(job("2020-02-01", "2020-02-04")).await.unwrap();

        let worker = worker(store.clone(), recommender.clone(), blobs.clone());
        let outcome = worker.poll_once().await;

        let location = match outcome {
            PollOutcome::Processed(JobOutcome::Completed(location)) => location,
            other => panic!("unexpected outcome: {:?}", other),
        };
        let body = String::from_utf8(blobs.get(&location.key).await.unwrap()).unwrap();
        assert_eq!(
            body,
            "date,activity\n2020-02-01,swimming\n2020-02-02,swimming\n2020-02-03,swimming\n"
        );

        let calls = recommender.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(c, prior)| c == "male" && prior.is_empty()));

        match store.lookup(record.job_id).await {
            JobLookup::Found(done) => {
                assert_eq!(done.status, JobStatus::Done);
                assert_eq!(done.output, Some(location));
            }
            other => panic!("unexpected lookup: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_dates_abandon_job_in_progress() {
        let store = Arc::new(InMemoryJobStore::new());
        let recommender = Arc::new(ScriptedRecommender::new("swimming"));
        let blobs = Arc::new(InMemoryBlobStore::new("activity-results"));
        let record = store.submit(job("2020-02-30", "2020-03-04")).await.unwrap();

        let worker = worker(store.clone(), recommender.clone(), blobs.clone());
        assert_eq!(worker.poll_once().await, PollOutcome::Processed(JobOutcome::Abandoned));

        assert!(recommender.calls.lock().unwrap().is_empty());
        assert!(blobs.keys().is_empty());
        match store.lookup(record.job_id).await {
            JobLookup::Found(stuck) => {
                assert_eq!(stuck.status, JobStatus::InProgress);
                assert!(!stuck.pending);
            }
            other => panic!("unexpected lookup: {:?}", other),
        }
        // Not offered again.
        assert_eq!(worker.poll_once().await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_loop() {
        let store = Arc::new(InMemoryJobStore::new());
        let blobs = Arc::new(BrokenBlobStore {
            attempts: AtomicU32::new(0),
        });
        let first = store.submit(job("2020-02-01", "2020-02-02")).await.unwrap();
        let mut second = job("2020-02-01", "2020-02-03");
        second.requested_ts = first.requested_ts + chrono::Duration::seconds(1);
        store.submit(second).await.unwrap();

        let recommender = Arc::new(ScriptedRecommender::new("swimming"));
        let worker = worker(store.clone(), recommender, blobs.clone());
        let processed = worker.run().await;

        assert_eq!(processed, 2);
        // One attempt per job, no retries.
        assert_eq!(blobs.attempts.load(Ordering::SeqCst), 2);
        assert!(store
            .records()
            .iter()
            .all(|r| r.status == JobStatus::InProgress && r.output.is_none()));
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_artifact_and_loop_running() {
        let store = Arc::new(StaleCompletionStore {
            inner: InMemoryJobStore::new(),
            completions: AtomicU32::new(0),
        });
        let blobs = Arc::new(InMemoryBlobStore::new("activity-results"));
        let first = store.submit(job("2020-02-01", "2020-02-02")).await.unwrap();
        let mut second = job("2020-02-01", "2020-02-03");
        second.requested_ts = first.requested_ts + chrono::Duration::seconds(1);
        let second = store.submit(second).await.unwrap();

        let recommender = Arc::new(ScriptedRecommender::new("swimming"));
        let worker = worker(store.clone(), recommender, blobs.clone());

        let location = match worker.poll_once().await {
            PollOutcome::Processed(JobOutcome::CompletionFailed(location)) => location,
            other => panic!("unexpected outcome: {:?}", other),
        };
        let body = String::from_utf8(blobs.get(&location.key).await.unwrap()).unwrap();
        assert_eq!(body, "date,activity\n2020-02-01,swimming\n");
        match store.lookup(first.job_id).await {
            JobLookup::Found(stuck) => {
                assert_eq!(stuck.status, JobStatus::InProgress);
                assert!(stuck.output.is_none());
            }
            other => panic!("unexpected lookup: {:?}", other),
        }

        // The loop moves on to the next queued job.
        assert_eq!(worker.run().await, 1);
        assert_eq!(store.completions.load(Ordering::SeqCst), 2);
        match store.lookup(second.job_id).await {
            JobLookup::Found(stuck) => assert_eq!(stuck.status, JobStatus::InProgress),
            other => panic!("unexpected lookup: {:?}", other),
        }
        assert_eq!(blobs.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_fires_for_every_planned_day() {
        let store = Arc::new(InMemoryJobStore::new());
        store.submit(job("2020-02-01", "2020-02-04")).await.unwrap();
        let heartbeat = Arc::new(CountingHeartbeat::default());

        let worker = JobWorker::new(
            store,
            Arc::new(ScriptedRecommender::new("swimming")),
            ResultPublisher::new(Arc::new(InMemoryBlobStore::new("activity-results"))),
            test_policy(1),
        )
        .with_heartbeat(heartbeat.clone());

        assert_eq!(worker.run().await, 1);
        // One beat for the poll cycle, then one per day of the three-day job.
        assert_eq!(heartbeat.beats.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_run_honours_iteration_cap() {
        let store = Arc::new(InMemoryJobStore::new());
        let heartbeat = Arc::new(CountingHeartbeat::default());
        let worker = worker(
            store,
            Arc::new(ScriptedRecommender::new("swimming")),
            Arc::new(InMemoryBlobStore::new("activity-results")),
        )
        .with_heartbeat(heartbeat.clone());

        let processed = worker.run().await;

        assert_eq!(processed, 0);
        assert_eq!(heartbeat.beats.load(Ordering::SeqCst), 3);
    }
}
