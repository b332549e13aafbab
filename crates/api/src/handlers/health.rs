//! Health check endpoint.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// GET /health
///
/// Liveness plus a database round-trip. Always returns 200; a broken
/// pool shows up as `db_healthy: false` so load balancers keep routing
/// while operators investigate.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = sendjoy_db::health_check(&state.pool).await.is_ok();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "db_healthy": db_healthy,
    }))
}
