//! Weighted activity recommendation.
//!
//! Each category owns a table of observation counts. Sampling draws one label
//! with probability `count / total` from a `WeightedIndex` over an `StdRng`
//! seeded from OS entropy (or a fixed seed in tests).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::PgPool;

use crate::db::activity_queries;
use crate::models::recommendation::Recommendation;

/// One `(category, label, count)` observation row.
pub type CountRow = (String, String, u64);

/// Storage for per-category observation counts.
///
/// Implementations must make `increment` atomic per `(category, label)` pair.
#[async_trait]
pub trait FrequencyStore: Send + Sync {
    async fn is_known_category(&self, category: &str) -> Result<bool, FrequencyError>;

    /// Add one observation, inserting the label at 1 when unseen. Returns the new count.
    async fn increment(&self, category: &str, label: &str) -> Result<u64, FrequencyError>;

    /// Rows for one category, or for every category when `None`, ordered by category then label.
    async fn counts(&self, category: Option<&str>) -> Result<Vec<CountRow>, FrequencyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FrequencyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Negative count {count} for {category}/{label}")]
    InvalidCount {
        category: String,
        label: String,
        count: i64,
    },

    #[error("Frequency table lock poisoned")]
    Poisoned,
}

/// Process-local frequency table.
pub struct InMemoryFrequencyStore {
    table: Mutex<BTreeMap<String, BTreeMap<String, u64>>>,
}

impl InMemoryFrequencyStore {
    /// Build a table where every seeded label starts at `prior` (at least 1).
    pub fn with_prior(prior: u64, buckets: &[(&str, &[&str])]) -> Self {
        let prior = prior.max(1);
        let table = buckets
            .iter()
            .map(|(category, labels)| {
                let counts: BTreeMap<String, u64> =
                    labels.iter().map(|l| (l.to_string(), prior)).collect();
                (category.to_lowercase(), counts)
            })
            .collect();
        Self {
            table: Mutex::new(table),
        }
    }

    pub fn empty() -> Self {
        Self::with_prior(1, &[])
    }

    /// The starter table: two categories with a handful of activities each.
    pub fn starter() -> Self {
        Self::with_prior(
            1,
            &[
                ("male", &["basketball", "baseball", "swimming"]),
                ("female", &["shopping", "swimming"]),
            ],
        )
    }

    pub fn count(&self, category: &str, label: &str) -> Option<u64> {
        let table = self.table.lock().ok()?;
        table.get(category)?.get(label).copied()
    }
}

#[async_trait]
impl FrequencyStore for InMemoryFrequencyStore {
    async fn is_known_category(&self, category: &str) -> Result<bool, FrequencyError> {
        let table = self.table.lock().map_err(|_| FrequencyError::Poisoned)?;
        Ok(table.contains_key(category))
    }

    async fn increment(&self, category: &str, label: &str) -> Result<u64, FrequencyError> {
        let mut table = self.table.lock().map_err(|_| FrequencyError::Poisoned)?;
        let count = table
            .entry(category.to_string())
            .or_default()
            .entry(label.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        Ok(*count)
    }

    async fn counts(&self, category: Option<&str>) -> Result<Vec<CountRow>, FrequencyError> {
        let table = self.table.lock().map_err(|_| FrequencyError::Poisoned)?;
        Ok(table
            .iter()
            .filter(|(c, _)| category.map_or(true, |wanted| wanted == c.as_str()))
            .flat_map(|(c, labels)| {
                labels
                    .iter()
                    .map(move |(label, count)| (c.clone(), label.clone(), *count))
            })
            .collect())
    }
}

/// Postgres-backed frequency table (`activity_counts`).
pub struct PgFrequencyStore {
    pool: PgPool,
}

impl PgFrequencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FrequencyStore for PgFrequencyStore {
    async fn is_known_category(&self, category: &str) -> Result<bool, FrequencyError> {
        Ok(activity_queries::category_exists(&self.pool, category).await?)
    }

    async fn increment(&self, category: &str, label: &str) -> Result<u64, FrequencyError> {
        let count = activity_queries::increment_activity(&self.pool, category, label).await?;
        u64::try_from(count).map_err(|_| FrequencyError::InvalidCount {
            category: category.to_string(),
            label: label.to_string(),
            count,
        })
    }

    async fn counts(&self, category: Option<&str>) -> Result<Vec<CountRow>, FrequencyError> {
        activity_queries::get_activity_counts(&self.pool, category)
            .await?
            .into_iter()
            .map(|(category, label, count)| match u64::try_from(count) {
                Ok(c) => Ok((category, label, c)),
                Err(_) => Err(FrequencyError::InvalidCount {
                    category,
                    label,
                    count,
                }),
            })
            .collect()
    }
}

/// Selection probability of each pool entry: `count / total`.
///
/// Returns an empty vector when the pool is empty or every count is zero.
pub fn selection_probabilities(pool: &[(String, u64)]) -> Vec<f64> {
    let total: u64 = pool.iter().map(|(_, c)| *c).sum();
    if total == 0 {
        return Vec::new();
    }
    pool.iter().map(|(_, c)| *c as f64 / total as f64).collect()
}

/// Merge rows into one entry per label, keeping first-seen order.
fn build_pool(rows: Vec<CountRow>) -> Vec<(String, u64)> {
    let mut pool: Vec<(String, u64)> = Vec::with_capacity(rows.len());
    for (_, label, count) in rows {
        match pool.iter_mut().find(|(l, _)| *l == label) {
            Some((_, total)) => *total += count,
            None => pool.push((label, count)),
        }
    }
    pool
}

pub struct RecommendationEngine {
    store: Arc<dyn FrequencyStore>,
    rng: Mutex<StdRng>,
}

impl RecommendationEngine {
    /// Engine drawing from an entropy-seeded `StdRng`.
    pub fn new(store: Arc<dyn FrequencyStore>) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Engine with a reproducible random stream.
    pub fn with_seed(store: Arc<dyn FrequencyStore>, seed: u64) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Reinforce `prior_outcome` (if any), then draw one activity for `category`.
    ///
    /// Unknown categories draw from the union of every bucket. An empty pool yields
    /// [`Recommendation::empty`].
    pub async fn sample(&self, category: &str, prior_outcome: &str) -> Recommendation {
        let category = category.to_lowercase();

        let known = match self.store.is_known_category(&category).await {
            Ok(known) => known,
            Err(e) => {
                tracing::error!(category = %category, error = %e, "Failed to read frequency table");
                return Recommendation::empty();
            }
        };

        if !prior_outcome.is_empty() {
            if known {
                match self.store.increment(&category, prior_outcome).await {
                    Ok(count) => tracing::info!(
                        category = %category,
                        activity = %prior_outcome,
                        count,
                        "Reinforced past activity"
                    ),
                    Err(e) => tracing::error!(
                        category = %category,
                        activity = %prior_outcome,
                        error = %e,
                        "Failed to reinforce past activity"
                    ),
                }
            } else {
                tracing::info!(
                    category = %category,
                    activity = %prior_outcome,
                    "Ignoring past activity for unknown category"
                );
            }
        }

        let rows = match self
            .store
            .counts(known.then_some(category.as_str()))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(category = %category, error = %e, "Failed to read frequency table");
                return Recommendation::empty();
            }
        };

        let pool = build_pool(rows);
        let probabilities = selection_probabilities(&pool);
        if probabilities.is_empty() {
            tracing::warn!(category = %category, "No activity found, returning no recommendation");
            return Recommendation::empty();
        }
        tracing::info!(category = %category, ?pool, ?probabilities, "Built candidate pool");

        let chosen = match self.draw(&pool) {
            Some(index) => pool[index].0.clone(),
            None => return Recommendation::empty(),
        };

        Recommendation {
            candidate_set: pool.into_iter().map(|(label, _)| label).collect(),
            chosen_outcome: chosen,
        }
    }

    fn draw(&self, pool: &[(String, u64)]) -> Option<usize> {
        let dist = match WeightedIndex::new(pool.iter().map(|(_, c)| *c)) {
            Ok(dist) => dist,
            Err(e) => {
                tracing::error!(error = %e, "Cannot build weighted distribution");
                return None;
            }
        };
        let mut rng = self.rng.lock().ok()?;
        Some(dist.sample(&mut *rng))
    }
}
