//! Contact directory seam.
//!
//! The CRM owns the `contacts` table; the engine only needs an existence
//! check at enrollment time, so the dependency is a single-method trait
//! with a Postgres-backed production implementation and trivial fakes in
//! tests.

use async_trait::async_trait;
use sendjoy_core::types::DbId;
use sendjoy_core::CoreError;
use sendjoy_db::DbPool;

/// Read-only view of the CRM's contact store.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Whether the contact exists.
    async fn exists(&self, contact_id: DbId) -> Result<bool, CoreError>;
}

/// Production implementation querying the CRM's `contacts` table.
pub struct PgContactDirectory {
    pool: DbPool,
}

impl PgContactDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactDirectory for PgContactDirectory {
    async fn exists(&self, contact_id: DbId) -> Result<bool, CoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM contacts WHERE id = $1)")
            .bind(contact_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(format!("contact lookup failed: {e}")))
    }
}
