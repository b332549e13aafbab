//! Route definitions for the `/queue` inspection resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Routes mounted at `/queue`.
///
/// ```text
/// GET    /counts          -> counts
/// GET    /dead-letter     -> dead_letter
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/counts", get(queue::counts))
        .route("/dead-letter", get(queue::dead_letter))
}
