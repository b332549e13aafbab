//! Persisted workflow lifecycle event.

use serde::Serialize;
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: DbId,
    /// Dot-separated event name, e.g. `"run.enrolled"`.
    pub event_type: String,
    pub run_id: Option<DbId>,
    pub contact_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
