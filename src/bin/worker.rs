use activity_planner::{
    config::AppConfig,
    db,
    services::{
        job_store::PgJobStore,
        launcher::{RedisHeartbeat, RedisLaunchTrigger},
        publisher::ResultPublisher,
        recommender::HttpRecommender,
        storage::S3BlobStore,
        worker::{JobWorker, PollPolicy},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting activity planning worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Worker metrics are scraped from their own listener
    PrometheusBuilder::new()
        .with_http_listener(config.worker_metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");
    tracing::info!(addr = %config.worker_metrics_addr, "Serving worker metrics");

    metrics::describe_counter!(
        "activity_jobs_completed_total",
        "Total activity planning jobs published and marked done"
    );
    metrics::describe_counter!(
        "activity_jobs_abandoned_total",
        "Total claimed jobs left in progress because their dates did not parse"
    );
    metrics::describe_histogram!(
        "activity_job_processing_seconds",
        metrics::Unit::Seconds,
        "Time from claim to completion of one job"
    );

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, db::PoolRole::Worker)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = S3BlobStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize blob storage client");

    let recommender = HttpRecommender::new(
        &config.recommender_url,
        Duration::from_secs(config.recommender_timeout_secs),
    )
    .expect("Failed to initialize recommendation client");

    let launcher = RedisLaunchTrigger::new(&config.redis_url, config.worker_heartbeat_ttl_secs)
        .expect("Failed to initialize launch trigger");

    let worker_id = Uuid::new_v4().to_string();

    let worker = JobWorker::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(recommender),
        ResultPublisher::new(Arc::new(storage)),
        PollPolicy::forever(Duration::from_secs(config.poll_interval_secs)),
    )
    .with_heartbeat(Arc::new(RedisHeartbeat::new(launcher, worker_id.clone())));

    tracing::info!(worker_id = %worker_id, "Worker ready, starting job processing loop");

    let processed = worker.run().await;

    tracing::info!(processed, "Ending activity planning worker");
}
