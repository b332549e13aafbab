pub mod health;
pub mod queue;
pub mod runs;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /workflows/enroll        enroll a contact (POST)
///
/// /runs                    list runs
/// /runs/{id}               run with steps
/// /runs/{id}/retry         manual retry (POST)
/// /runs/{id}/cancel        cancel (POST)
///
/// /queue/counts            job counts by state
/// /queue/dead-letter       parked jobs for inspection
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/workflows", workflows::router())
        .nest("/runs", runs::router())
        .nest("/queue", queue::router())
}
