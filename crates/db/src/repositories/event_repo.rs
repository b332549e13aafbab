//! Repository for the `events` table.

use sendjoy_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::Event;

/// Column list for `events` queries.
const COLUMNS: &str = "id, event_type, run_id, contact_id, payload, created_at";

/// Provides read/write operations for workflow lifecycle events.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new event row, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        run_id: Option<DbId>,
        contact_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events (event_type, run_id, contact_id, payload) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(run_id)
        .bind(contact_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// List a run's events, newest first.
    pub async fn list_by_run(pool: &PgPool, run_id: DbId) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events \
             WHERE run_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as(&query).bind(run_id).fetch_all(pool).await
    }
}
