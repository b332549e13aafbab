//! Handlers for the `/queue` inspection resource (operator tooling).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use sendjoy_db::repositories::QueueJobRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /queue/counts
///
/// Job counts by state (waiting / delayed / active / completed / failed).
pub async fn counts(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let counts = QueueJobRepo::counts_by_state(&state.pool).await?;
    Ok(Json(DataResponse { data: counts }))
}

/// GET /queue/dead-letter
///
/// Jobs parked after exhausting queue-level redelivery, newest first.
pub async fn dead_letter(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = QueueJobRepo::list_dead_lettered(&state.pool).await?;
    Ok(Json(DataResponse { data: jobs }))
}
