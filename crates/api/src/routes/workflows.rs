//! Route definitions for the `/workflows` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// POST   /enroll          -> enroll
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/enroll", post(workflows::enroll))
}
