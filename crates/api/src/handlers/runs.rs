//! Handlers for the `/runs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sendjoy_core::types::DbId;
use sendjoy_core::CoreError;
use sendjoy_db::models::run::RunListQuery;
use sendjoy_db::repositories::WorkflowRunRepo;
use sendjoy_engine::control;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /runs
///
/// List runs, newest first. Supports optional `contact_id`, `status_id`,
/// `limit`, and `offset` query parameters.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunListQuery>,
) -> AppResult<impl IntoResponse> {
    let runs = WorkflowRunRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: runs }))
}

/// GET /runs/{id}
///
/// Fetch a single run together with its step sequence.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let run = WorkflowRunRepo::find_with_steps(&state.pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))?;
    Ok(Json(DataResponse { data: run }))
}

/// POST /runs/{id}/retry
///
/// Manually retry a failed run. Returns 409 `RUN_NOT_RETRYABLE` when the
/// run is not in the Failed state.
pub async fn retry_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    control::retry_run(&state.pool, &state.event_bus, run_id).await?;
    Ok(Json(DataResponse {
        data: json!({"ok": true}),
    }))
}

/// POST /runs/{id}/cancel
///
/// Cancel a pending or running run. Returns 204 on success, 409 when the
/// run is already terminal. Cancellation only prevents future steps; a
/// send already in flight at the gateway is not interrupted.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    control::cancel_run(&state.pool, &state.event_bus, run_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
