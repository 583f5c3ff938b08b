use garde::Validate;
use serde::{Deserialize, Serialize};

/// Request body of the recommendation service.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecommendRequest {
    #[garde(length(min = 1, max = 100))]
    pub category: String,

    /// Outcome the caller already observed; empty means "none".
    #[serde(default)]
    #[garde(length(max = 100))]
    pub prior_outcome: String,
}

/// Response of the recommendation service.
///
/// An empty `chosen_outcome` means no recommendation is available. It is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    pub candidate_set: Vec<String>,
    pub chosen_outcome: String,
}

impl Recommendation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen_outcome.is_empty()
    }
}
