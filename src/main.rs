use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use activity_planner::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        engine::{PgFrequencyStore, RecommendationEngine},
        job_store::PgJobStore,
        launcher::RedisLaunchTrigger,
        publisher::ResultPublisher,
        storage::S3BlobStore,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing activity-planner server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!(
        "activity_jobs_submitted_total",
        "Total activity planning jobs submitted"
    );
    metrics::describe_gauge!(
        "activity_jobs_pending",
        "Jobs waiting for a worker, sampled on each health check"
    );
    metrics::describe_counter!(
        "recommendations_served_total",
        "Total recommendations served, labelled by whether the answer was empty"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, db::PoolRole::Api)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing blob storage client");
    let storage = S3BlobStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize blob storage client");

    tracing::info!("Connecting to Redis launch trigger");
    let launcher = RedisLaunchTrigger::new(&config.redis_url, config.worker_heartbeat_ttl_secs)
        .expect("Failed to initialize launch trigger");

    let engine = RecommendationEngine::new(Arc::new(PgFrequencyStore::new(db_pool.clone())));

    let state = AppState::new(
        Arc::new(PgJobStore::new(db_pool)),
        engine,
        ResultPublisher::new(Arc::new(storage)),
        Arc::new(launcher),
    );

    let app = routes::api_router(state)
        .merge(routes::metrics::metrics_router(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    tracing::info!("Starting activity-planner on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
