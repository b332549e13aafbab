//! Repository for the `workflow_steps` table.

use sendjoy_core::fsm::StepStatus;
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::step::WorkflowStep;

/// Column list for `workflow_steps` queries. Shared with the run repo's
/// `find_with_steps`.
pub(crate) const STEP_COLUMNS: &str = "\
    id, run_id, step_index, action, status_id, attempt, max_attempts, \
    scheduled_at, executed_at, last_error, created_at, updated_at";

/// Provides reads and compare-and-swap transitions for workflow steps.
pub struct WorkflowStepRepo;

impl WorkflowStepRepo {
    /// Find a step by its owning run and position.
    pub async fn find(
        pool: &PgPool,
        run_id: DbId,
        step_index: i16,
    ) -> Result<Option<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps \
             WHERE run_id = $1 AND step_index = $2"
        );
        sqlx::query_as(&query)
            .bind(run_id)
            .bind(step_index)
            .fetch_optional(pool)
            .await
    }

    /// List a run's steps in index order.
    pub async fn list_by_run(
        pool: &PgPool,
        run_id: DbId,
    ) -> Result<Vec<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps \
             WHERE run_id = $1 ORDER BY step_index"
        );
        sqlx::query_as(&query).bind(run_id).fetch_all(pool).await
    }

    /// The first step of a run that ended in `Failed`, if any.
    pub async fn first_failed(
        pool: &PgPool,
        run_id: DbId,
    ) -> Result<Option<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps \
             WHERE run_id = $1 AND status_id = $2 \
             ORDER BY step_index LIMIT 1"
        );
        sqlx::query_as(&query)
            .bind(run_id)
            .bind(StepStatus::Failed.id())
            .fetch_optional(pool)
            .await
    }

    /// CAS `Scheduled -> Executing`, incrementing the attempt counter.
    ///
    /// Returns the updated row, or `None` when the swap was lost (the
    /// step was not in `Scheduled`; treat the triggering job as stale).
    pub async fn begin_attempt(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_steps \
             SET status_id = $3, attempt = attempt + 1, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {STEP_COLUMNS}"
        );
        sqlx::query_as(&query)
            .bind(id)
            .bind(StepStatus::Scheduled.id())
            .bind(StepStatus::Executing.id())
            .fetch_optional(pool)
            .await
    }

    /// CAS `Executing -> Succeeded`, stamping `executed_at`.
    pub async fn mark_succeeded(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_steps \
             SET status_id = $3, executed_at = NOW(), last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(StepStatus::Executing.id())
        .bind(StepStatus::Succeeded.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Executing -> Failed`, retaining the final error message.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_steps \
             SET status_id = $3, last_error = $4, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(StepStatus::Executing.id())
        .bind(StepStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Executing -> Scheduled` for a retry after a transient failure.
    ///
    /// Records the attempt's error and the new due time; the attempt
    /// counter keeps its value (it re-increments on the next claim).
    pub async fn reschedule(
        pool: &PgPool,
        id: DbId,
        due: Timestamp,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_steps \
             SET status_id = $3, scheduled_at = $4, last_error = $5, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(StepStatus::Executing.id())
        .bind(StepStatus::Scheduled.id())
        .bind(due)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Pending -> Scheduled` for the next step after a success.
    pub async fn schedule(
        pool: &PgPool,
        id: DbId,
        due: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_steps \
             SET status_id = $3, scheduled_at = $4, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(StepStatus::Pending.id())
        .bind(StepStatus::Scheduled.id())
        .bind(due)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Failed -> Scheduled` for an operator-triggered manual retry.
    ///
    /// Resets the attempt counter to zero and clears the retained error.
    pub async fn reset_for_retry(
        pool: &PgPool,
        id: DbId,
        due: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_steps \
             SET status_id = $3, attempt = 0, scheduled_at = $4, \
                 last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(StepStatus::Failed.id())
        .bind(StepStatus::Scheduled.id())
        .bind(due)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
