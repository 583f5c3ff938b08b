use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::services::worker::Heartbeat;

const HEARTBEAT_KEY: &str = "activity_planner:worker:heartbeat";
const LAUNCH_CHANNEL: &str = "activity_planner:worker:launch";

/// Worker fleet bring-up, as seen from the submission path.
#[async_trait]
pub trait LaunchTrigger: Send + Sync {
    async fn is_worker_running(&self) -> Result<bool, LaunchError>;

    async fn start_worker(&self) -> Result<(), LaunchError>;

    async fn health_check(&self) -> Result<(), LaunchError> {
        Ok(())
    }
}

/// Redis-backed trigger.
///
/// Workers keep a heartbeat key alive with a TTL; a launch request is published
/// on a channel that the fleet controller consumes.
pub struct RedisLaunchTrigger {
    client: redis::Client,
    heartbeat_ttl_secs: u64,
}

impl RedisLaunchTrigger {
    pub fn new(redis_url: &str, heartbeat_ttl_secs: u64) -> Result<Self, LaunchError> {
        let client = redis::Client::open(redis_url).map_err(LaunchError::Redis)?;
        Ok(Self {
            client,
            heartbeat_ttl_secs,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, LaunchError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(LaunchError::Redis)
    }

    /// Refresh this worker's heartbeat.
    pub async fn heartbeat(&self, worker_id: &str) -> Result<(), LaunchError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(HEARTBEAT_KEY, worker_id, self.heartbeat_ttl_secs)
            .await
            .map_err(LaunchError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl LaunchTrigger for RedisLaunchTrigger {
    async fn is_worker_running(&self) -> Result<bool, LaunchError> {
        let mut conn = self.connection().await?;
        let running: bool = conn.exists(HEARTBEAT_KEY).await.map_err(LaunchError::Redis)?;
        Ok(running)
    }

    async fn start_worker(&self) -> Result<(), LaunchError> {
        let mut conn = self.connection().await?;
        let receivers: u64 = conn
            .publish(LAUNCH_CHANNEL, "start")
            .await
            .map_err(LaunchError::Redis)?;
        if receivers == 0 {
            return Err(LaunchError::NoController);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), LaunchError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(LaunchError::Redis)?;
        Ok(())
    }
}

/// Heartbeat of one worker process, kept in the trigger's heartbeat key.
pub struct RedisHeartbeat {
    trigger: RedisLaunchTrigger,
    worker_id: String,
}

impl RedisHeartbeat {
    pub fn new(trigger: RedisLaunchTrigger, worker_id: String) -> Self {
        Self { trigger, worker_id }
    }
}

#[async_trait]
impl Heartbeat for RedisHeartbeat {
    async fn beat(&self) {
        if let Err(e) = self.trigger.heartbeat(&self.worker_id).await {
            tracing::warn!(
                worker_id = %self.worker_id,
                error = %e,
                "Failed to refresh worker heartbeat"
            );
        }
    }
}

/// Ask for a worker unless one is already running. Failures are logged only.
pub async fn ensure_worker(trigger: &dyn LaunchTrigger) {
    match trigger.is_worker_running().await {
        Ok(true) => tracing::debug!("Worker already running"),
        Ok(false) => match trigger.start_worker().await {
            Ok(()) => tracing::info!("Requested worker launch"),
            Err(e) => tracing::error!(error = %e, "Failed to request worker launch"),
        },
        Err(e) => tracing::error!(error = %e, "Failed to check for running workers"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("No fleet controller is listening for launch requests")]
    NoController,
}
