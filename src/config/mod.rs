use std::net::SocketAddr;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for worker heartbeats and launch requests
    pub redis_url: String,

    /// Bucket holding published activity plans
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// Base URL of the recommendation service, used by the worker
    #[serde(default = "default_recommender_url")]
    pub recommender_url: String,

    #[serde(default = "default_recommender_timeout_secs")]
    pub recommender_timeout_secs: u64,

    /// Worker sleep between empty polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_worker_heartbeat_ttl_secs")]
    pub worker_heartbeat_ttl_secs: u64,

    /// Prometheus scrape listener of the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: SocketAddr,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_recommender_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_recommender_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_worker_heartbeat_ttl_secs() -> u64 {
    30
}

fn default_worker_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9091))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
