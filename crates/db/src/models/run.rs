//! Workflow run entity and DTOs.

use serde::{Deserialize, Serialize};
use sendjoy_core::fsm::{RunStatus, StatusId};
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::step::WorkflowStep;

/// A row from the `workflow_runs` table.
///
/// One run is one contact going through one workflow's step sequence.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowRun {
    pub id: DbId,
    pub contact_id: DbId,
    pub workflow_key: String,
    pub status_id: StatusId,
    /// When the run's first action should fire. `None` means "enrolled
    /// for immediate start" (the stored value is the enrollment time).
    pub scheduled_at: Option<Timestamp>,
    /// Opaque action parameters (e.g. a media URL) carried to every step.
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkflowRun {
    /// Decode the stored status ID. `None` only on schema corruption.
    pub fn status(&self) -> Option<RunStatus> {
        RunStatus::from_id(self.status_id)
    }
}

/// Insert payload for a new run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub contact_id: DbId,
    pub workflow_key: String,
    pub scheduled_at: Timestamp,
    pub payload: serde_json::Value,
}

/// Query parameters for run listing.
#[derive(Debug, Default, Deserialize)]
pub struct RunListQuery {
    /// Filter by contact.
    pub contact_id: Option<DbId>,
    /// Filter by status ID (e.g. 2 = running, 4 = failed).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// A run together with its full step sequence, for inspection endpoints.
#[derive(Debug, Serialize)]
pub struct RunWithSteps {
    #[serde(flatten)]
    pub run: WorkflowRun,
    pub steps: Vec<WorkflowStep>,
}
