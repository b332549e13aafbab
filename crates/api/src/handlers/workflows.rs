//! Handlers for the `/workflows` resource.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sendjoy_core::types::{DbId, Timestamp};
use sendjoy_engine::EnrollRequest;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /workflows/enroll`.
#[derive(Debug, Deserialize, Validate)]
pub struct EnrollBody {
    #[validate(range(min = 1, message = "contact_id must be positive"))]
    pub contact_id: DbId,
    #[validate(length(min = 1, max = 64, message = "workflow_key must be 1-64 characters"))]
    pub workflow_key: String,
    /// When the run's first action should fire; omit for "now".
    pub run_at: Option<Timestamp>,
    /// Opaque action parameters (e.g. a media URL).
    pub payload: Option<serde_json::Value>,
}

/// Response body for a successful enrollment.
#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub run_id: DbId,
}

/// POST /workflows/enroll
///
/// Enroll a contact into a workflow. Returns 201 with the created run's
/// ID. No message is sent synchronously; delivery happens through the
/// worker, so this endpoint never blocks on the gateway.
pub async fn enroll(
    State(state): State<AppState>,
    Json(body): Json<EnrollBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let request = EnrollRequest {
        contact_id: body.contact_id,
        workflow_key: body.workflow_key,
        run_at: body.run_at,
        payload: body.payload,
    };
    let run = state.enrollment.enroll(&request).await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: EnrollResponse { run_id: run.id },
        }),
    ))
}
