//! Repository for the `workflow_runs` table.

use sendjoy_core::fsm::{RunStatus, StepStatus};
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::run::{NewRun, RunListQuery, RunWithSteps, WorkflowRun};
use crate::models::step::NewStep;
use crate::repositories::workflow_step_repo::STEP_COLUMNS;

/// Column list for `workflow_runs` queries.
const COLUMNS: &str = "\
    id, contact_id, workflow_key, status_id, scheduled_at, payload, \
    created_at, updated_at";

/// Maximum page size for run listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for run listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD and compare-and-swap transitions for workflow runs.
pub struct WorkflowRunRepo;

impl WorkflowRunRepo {
    /// Atomically create a run with its full step sequence and the queue
    /// job for step 0.
    ///
    /// In one transaction:
    /// 1. insert the run as `Pending`,
    /// 2. bulk-insert every step as `Pending`,
    /// 3. mark step 0 `Scheduled` with `scheduled_at = step0_due`,
    /// 4. enqueue step 0's queue job (`Waiting` if already due, `Delayed`
    ///    for future-dated enrollments),
    /// 5. mark the run `Running`.
    ///
    /// Either all rows exist afterwards or none do. A unique violation on
    /// `uq_workflow_runs_active` (another non-terminal run for the same
    /// contact and workflow key) aborts the transaction and propagates.
    ///
    /// `steps` must be non-empty; the registry guarantees every workflow
    /// has at least one step.
    pub async fn create_with_steps(
        pool: &PgPool,
        run: &NewRun,
        steps: &[NewStep],
        step0_due: Timestamp,
    ) -> Result<WorkflowRun, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let insert_run = format!(
            "INSERT INTO workflow_runs (contact_id, workflow_key, status_id, scheduled_at, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let created: WorkflowRun = sqlx::query_as(&insert_run)
            .bind(run.contact_id)
            .bind(&run.workflow_key)
            .bind(RunStatus::Pending.id())
            .bind(run.scheduled_at)
            .bind(&run.payload)
            .fetch_one(&mut *tx)
            .await?;

        for step in steps {
            sqlx::query(
                "INSERT INTO workflow_steps (run_id, step_index, action, status_id, max_attempts) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(created.id)
            .bind(step.step_index)
            .bind(&step.action)
            .bind(StepStatus::Pending.id())
            .bind(step.max_attempts)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE workflow_steps \
             SET status_id = $2, scheduled_at = $3, updated_at = NOW() \
             WHERE run_id = $1 AND step_index = 0",
        )
        .bind(created.id)
        .bind(StepStatus::Scheduled.id())
        .bind(step0_due)
        .execute(&mut *tx)
        .await?;

        // Step 0's job. State 1 = waiting, 2 = delayed (not yet due).
        let first = &steps[0];
        sqlx::query(
            "INSERT INTO queue_jobs \
                 (run_id, step_index, kind, payload, not_before, max_attempts, state_id) \
             VALUES ($1, 0, $2, $3, $4, $5, \
                     CASE WHEN $4 <= NOW() THEN 1 ELSE 2 END)",
        )
        .bind(created.id)
        .bind(&first.action)
        .bind(&run.payload)
        .bind(step0_due)
        .bind(first.max_attempts)
        .execute(&mut *tx)
        .await?;

        let promote_run = format!(
            "UPDATE workflow_runs SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let running: WorkflowRun = sqlx::query_as(&promote_run)
            .bind(created.id)
            .bind(RunStatus::Running.id())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(running)
    }

    /// Find a run by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_runs WHERE id = $1");
        sqlx::query_as(&query).bind(id).fetch_optional(pool).await
    }

    /// Fetch a run together with its steps, ordered by step index.
    pub async fn find_with_steps(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<RunWithSteps>, sqlx::Error> {
        let Some(run) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps \
             WHERE run_id = $1 ORDER BY step_index"
        );
        let steps = sqlx::query_as(&query).bind(id).fetch_all(pool).await?;

        Ok(Some(RunWithSteps { run, steps }))
    }

    /// Whether the contact has a non-terminal run for this workflow key.
    pub async fn has_active(
        pool: &PgPool,
        contact_id: DbId,
        workflow_key: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM workflow_runs \
                 WHERE contact_id = $1 AND workflow_key = $2 \
                   AND status_id IN ($3, $4) \
             )",
        )
        .bind(contact_id)
        .bind(workflow_key)
        .bind(RunStatus::Pending.id())
        .bind(RunStatus::Running.id())
        .fetch_one(pool)
        .await
    }

    /// List runs with optional contact and status filters, newest first.
    pub async fn list(
        pool: &PgPool,
        params: &RunListQuery,
    ) -> Result<Vec<WorkflowRun>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.contact_id.is_some() {
            conditions.push(format!("contact_id = ${bind_idx}"));
            bind_idx += 1;
        }

        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM workflow_runs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, WorkflowRun>(&query);

        if let Some(cid) = params.contact_id {
            q = q.bind(cid);
        }
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }

        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }

    /// Compare-and-swap the run status.
    ///
    /// Applies only when the stored status equals `from`. Returns `false`
    /// when the swap was lost (someone else already moved the run).
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_runs SET status_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(from.id())
        .bind(to.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
