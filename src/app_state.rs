use std::sync::Arc;

use crate::services::{
    engine::RecommendationEngine, job_store::JobStore, launcher::LaunchTrigger,
    publisher::ResultPublisher,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub engine: Arc<RecommendationEngine>,
    pub publisher: Arc<ResultPublisher>,
    pub launcher: Arc<dyn LaunchTrigger>,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        engine: RecommendationEngine,
        publisher: ResultPublisher,
        launcher: Arc<dyn LaunchTrigger>,
    ) -> Self {
        Self {
            jobs,
            engine: Arc::new(engine),
            publisher: Arc::new(publisher),
            launcher,
        }
    }
}
