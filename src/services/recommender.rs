//! Callers of the recommendation service.
//!
//! Calls are single-attempt: a failure is logged and reported as
//! [`Recommendation::empty`], which callers treat as "no recommendation".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::models::recommendation::{RecommendRequest, Recommendation};
use crate::services::engine::RecommendationEngine;

/// How many times a failed remote call is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
}

impl RetryPolicy {
    /// Remote calls are never repeated.
    pub const NONE: RetryPolicy = RetryPolicy { retries: 0 };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, category: &str, prior_outcome: &str) -> Recommendation;
}

/// HTTP client for `POST /api/v1/recommend`.
pub struct HttpRecommender {
    http: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpRecommender {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RecommendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RecommendError::Http)?;
        Ok(Self {
            http,
            url: format!("{}/api/v1/recommend", base_url.trim_end_matches('/')),
            retry: RetryPolicy::NONE,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn call(&self, request: &RecommendRequest) -> Result<Recommendation, RecommendError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(RecommendError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecommendError::Status(status.as_u16()));
        }

        response.json().await.map_err(RecommendError::Http)
    }
}

#[async_trait]
impl Recommender for HttpRecommender {
    async fn recommend(&self, category: &str, prior_outcome: &str) -> Recommendation {
        let request = RecommendRequest {
            category: category.to_string(),
            prior_outcome: prior_outcome.to_string(),
        };

        let mut attempt = 0;
        loop {
            match self.call(&request).await {
                Ok(recommendation) => return recommendation,
                Err(e) if attempt < self.retry.retries => {
                    attempt += 1;
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        error = %e,
                        "Recommendation call failed, retrying"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        url = %self.url,
                        error = %e,
                        "Cannot invoke recommendation service, returning no recommendation"
                    );
                    return Recommendation::empty();
                }
            }
        }
    }
}

/// In-process recommender calling the engine directly.
pub struct LocalRecommender {
    engine: Arc<RecommendationEngine>,
}

impl LocalRecommender {
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Recommender for LocalRecommender {
    async fn recommend(&self, category: &str, prior_outcome: &str) -> Recommendation {
        self.engine.sample(category, prior_outcome).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Recommendation service returned HTTP {0}")]
    Status(u16),
}
