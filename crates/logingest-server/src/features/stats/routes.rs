use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::queries::{get_stats::handle as handle_get_stats, GetLogStatsQuery};
use crate::{error::AppError, features::AppState};

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/log-stats", get(get_log_stats))
}

/// Aggregate level counts and hourly distribution
///
/// GET /log-stats
async fn get_log_stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let response = handle_get_stats(state.store.as_ref(), GetLogStatsQuery).await?;

    Ok((StatusCode::OK, Json(response)).into_response())
}
