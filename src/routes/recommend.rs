use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::recommendation::{RecommendRequest, Recommendation};

/// POST /api/v1/recommend: Draw one activity, reinforcing `prior_outcome` first.
///
/// An empty `chosen_outcome` is a valid "no recommendation" answer, not an error.
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<Recommendation>, StatusCode> {
    request.validate().map_err(|e| {
        tracing::debug!(error = %e, "Rejected recommendation request");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    tracing::info!(
        category = %request.category,
        prior_outcome = %request.prior_outcome,
        "Recommendation requested"
    );

    let recommendation = state
        .engine
        .sample(&request.category, &request.prior_outcome)
        .await;

    metrics::counter!(
        "recommendations_served_total",
        "empty" => recommendation.is_empty().to_string()
    )
    .increment(1);

    Ok(Json(recommendation))
}
