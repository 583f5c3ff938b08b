use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod activity_queries;
pub mod queries;

/// Which process a pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRole {
    /// Request handlers: job submission, lookups and frequency updates.
    Api,
    /// The polling loop holds at most one claim and one completion at a time.
    Worker,
}

impl PoolRole {
    fn max_connections(self) -> u32 {
        match self {
            PoolRole::Api => 10,
            PoolRole::Worker => 2,
        }
    }
}

/// Connect to the activity database with limits sized for `role`.
pub async fn init_pool(database_url: &str, role: PoolRole) -> Result<PgPool, sqlx::Error> {
    tracing::debug!(?role, max_connections = role.max_connections(), "Opening database pool");
    PgPoolOptions::new()
        .max_connections(role.max_connections())
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
}

/// Apply `activity_jobs` and `activity_counts` migrations. Only the API server runs these.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
