//! Route definitions for the `/runs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// GET    /                -> list_runs
/// GET    /{id}            -> get_run
/// POST   /{id}/retry      -> retry_run
/// POST   /{id}/cancel     -> cancel_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(runs::list_runs))
        .route("/{id}", get(runs::get_run))
        .route("/{id}/retry", post(runs::retry_run))
        .route("/{id}/cancel", post(runs::cancel_run))
}
