//! Durable queue job entity and DTOs.

use serde::Serialize;
use sendjoy_core::fsm::{QueueJobState, StatusId};
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `queue_jobs` table.
///
/// The queue owns these rows. A job references its target step by
/// `(run_id, step_index)` without a foreign key; the executor's
/// stale-job guard handles dangling references.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueJob {
    pub id: DbId,
    pub run_id: DbId,
    pub step_index: i16,
    pub kind: String,
    pub payload: serde_json::Value,
    /// The job is not eligible for claiming before this time.
    pub not_before: Timestamp,
    /// Step-level attempt counter mirrored into the queue row.
    pub attempt: i32,
    pub max_attempts: i32,
    pub state_id: StatusId,
    pub claimed_at: Option<Timestamp>,
    pub lease_expires_at: Option<Timestamp>,
    /// How many times the job has been delivered to a worker. Bounds
    /// queue-level redelivery, independent of the step retry budget.
    pub dequeue_count: i32,
    pub dead_lettered: bool,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl QueueJob {
    /// Decode the stored state ID. `None` only on schema corruption.
    pub fn state(&self) -> Option<QueueJobState> {
        QueueJobState::from_id(self.state_id)
    }
}

/// Insert payload for a new queue job.
#[derive(Debug, Clone)]
pub struct NewQueueJob {
    pub run_id: DbId,
    pub step_index: i16,
    pub kind: String,
    pub payload: serde_json::Value,
    pub not_before: Timestamp,
    pub max_attempts: i32,
}

/// Job counts by state, for the operator inspection endpoint.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}
