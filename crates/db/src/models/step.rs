//! Workflow step entity and DTOs.

use serde::Serialize;
use sendjoy_core::fsm::{StatusId, StepStatus};
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `workflow_steps` table.
///
/// Steps are created in bulk at enrollment, one per registry entry,
/// and owned by exactly one run (cascade-deleted with it).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowStep {
    pub id: DbId,
    pub run_id: DbId,
    /// 0-based position in the workflow's step sequence.
    pub step_index: i16,
    pub action: String,
    pub status_id: StatusId,
    pub attempt: i32,
    pub max_attempts: i32,
    pub scheduled_at: Option<Timestamp>,
    pub executed_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkflowStep {
    /// Decode the stored status ID. `None` only on schema corruption.
    pub fn status(&self) -> Option<StepStatus> {
        StepStatus::from_id(self.status_id)
    }
}

/// Insert payload for one step of a new run.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub step_index: i16,
    pub action: String,
    pub max_attempts: i32,
}
