//! Repository for the `queue_jobs` table.
//!
//! Implements the durable queue semantics: delayed visibility via
//! `not_before`, at-most-one-worker delivery via `FOR UPDATE SKIP LOCKED`
//! leases, backoff re-enqueue, and dead-lettering once the queue-level
//! redelivery bound is exhausted.

use sendjoy_core::fsm::QueueJobState;
use sendjoy_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::queue_job::{NewQueueJob, QueueCounts, QueueJob};

/// Column list for `queue_jobs` queries.
const COLUMNS: &str = "\
    id, run_id, step_index, kind, payload, not_before, attempt, \
    max_attempts, state_id, claimed_at, lease_expires_at, dequeue_count, \
    dead_lettered, last_error, created_at, updated_at";

/// Provides queue operations for durable step jobs.
pub struct QueueJobRepo;

impl QueueJobRepo {
    /// Enqueue a job. Jobs already due start `Waiting`; future-dated jobs
    /// start `Delayed`.
    pub async fn enqueue(pool: &PgPool, job: &NewQueueJob) -> Result<QueueJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_jobs \
                 (run_id, step_index, kind, payload, not_before, max_attempts, state_id) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                     CASE WHEN $5 <= NOW() THEN {waiting} ELSE {delayed} END) \
             RETURNING {COLUMNS}",
            waiting = QueueJobState::Waiting.id(),
            delayed = QueueJobState::Delayed.id(),
        );
        sqlx::query_as(&query)
            .bind(job.run_id)
            .bind(job.step_index)
            .bind(&job.kind)
            .bind(&job.payload)
            .bind(job.not_before)
            .bind(job.max_attempts)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the next due job for this worker.
    ///
    /// Due = `Waiting` or `Delayed` with `not_before <= now()`. Jobs due
    /// at the same instant are delivered in insertion order (`id ASC`).
    /// `FOR UPDATE SKIP LOCKED` guarantees at most one worker claims a
    /// given job; the claim takes a lease of `lease_secs` seconds, after
    /// which a crashed worker's job becomes reclaimable.
    pub async fn claim_due(
        pool: &PgPool,
        lease_secs: f64,
    ) -> Result<Option<QueueJob>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_jobs \
             SET state_id = $1, claimed_at = NOW(), \
                 lease_expires_at = NOW() + make_interval(secs => $2), \
                 dequeue_count = dequeue_count + 1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM queue_jobs \
                 WHERE state_id IN ($3, $4) AND not_before <= NOW() \
                 ORDER BY not_before ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as(&query)
            .bind(QueueJobState::Active.id())
            .bind(lease_secs)
            .bind(QueueJobState::Waiting.id())
            .bind(QueueJobState::Delayed.id())
            .fetch_optional(pool)
            .await
    }

    /// CAS `Active -> Completed` (ack). Also used to discard stale jobs.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_jobs \
             SET state_id = $3, lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(QueueJobState::Active.id())
        .bind(QueueJobState::Completed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Active -> Failed`, retaining the error. `dead_lettered` marks
    /// jobs parked for operator inspection after queue-level redelivery
    /// ran out, as opposed to ordinary step-exhaustion failures.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error: &str,
        dead_lettered: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_jobs \
             SET state_id = $3, last_error = $4, dead_lettered = $5, \
                 lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(QueueJobState::Active.id())
        .bind(QueueJobState::Failed.id())
        .bind(error)
        .bind(dead_lettered)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Active -> Delayed` for a step-level retry with backoff.
    ///
    /// Increments the job's attempt counter and records the error that
    /// caused the retry.
    pub async fn retry_delayed(
        pool: &PgPool,
        id: DbId,
        not_before: Timestamp,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_jobs \
             SET state_id = $3, not_before = $4, attempt = attempt + 1, \
                 last_error = $5, claimed_at = NULL, lease_expires_at = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(QueueJobState::Active.id())
        .bind(QueueJobState::Delayed.id())
        .bind(not_before)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS `Active -> Waiting`: queue-level redelivery after a processing
    /// error (persistence hiccup, not a delivery failure). The job stays
    /// immediately claimable; `dequeue_count` bounds how often this can
    /// happen before [`reap_expired_leases`](Self::reap_expired_leases)
    /// or the executor dead-letters it.
    pub async fn release(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_jobs \
             SET state_id = $3, last_error = $4, claimed_at = NULL, \
                 lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(QueueJobState::Active.id())
        .bind(QueueJobState::Waiting.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return crashed workers' jobs to the queue.
    ///
    /// `Active` jobs whose lease expired go back to `Waiting`, except
    /// those already delivered `redelivery_limit` times, which are
    /// dead-lettered instead. Returns `(reclaimed, dead_lettered)` counts.
    pub async fn reap_expired_leases(
        pool: &PgPool,
        redelivery_limit: i32,
    ) -> Result<(u64, u64), sqlx::Error> {
        let dead = sqlx::query(
            "UPDATE queue_jobs \
             SET state_id = $2, dead_lettered = TRUE, \
                 last_error = COALESCE(last_error, 'lease expired'), \
                 lease_expires_at = NULL, updated_at = NOW() \
             WHERE state_id = $1 AND lease_expires_at < NOW() \
               AND dequeue_count >= $3",
        )
        .bind(QueueJobState::Active.id())
        .bind(QueueJobState::Failed.id())
        .bind(redelivery_limit)
        .execute(pool)
        .await?;

        let reclaimed = sqlx::query(
            "UPDATE queue_jobs \
             SET state_id = $2, claimed_at = NULL, lease_expires_at = NULL, \
                 updated_at = NOW() \
             WHERE state_id = $1 AND lease_expires_at < NOW()",
        )
        .bind(QueueJobState::Active.id())
        .bind(QueueJobState::Waiting.id())
        .execute(pool)
        .await?;

        Ok((reclaimed.rows_affected(), dead.rows_affected()))
    }

    /// Job counts by state, for the inspection endpoint.
    pub async fn counts_by_state(pool: &PgPool) -> Result<QueueCounts, sqlx::Error> {
        let rows: Vec<(i16, i64)> = sqlx::query_as(
            "SELECT state_id, COUNT(*) FROM queue_jobs GROUP BY state_id",
        )
        .fetch_all(pool)
        .await?;

        let mut counts = QueueCounts::default();
        for (state_id, count) in rows {
            match QueueJobState::from_id(state_id) {
                Some(QueueJobState::Waiting) => counts.waiting = count,
                Some(QueueJobState::Delayed) => counts.delayed = count,
                Some(QueueJobState::Active) => counts.active = count,
                Some(QueueJobState::Completed) => counts.completed = count,
                Some(QueueJobState::Failed) => counts.failed = count,
                None => tracing::warn!(state_id, "Unknown queue job state in counts"),
            }
        }
        Ok(counts)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<QueueJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_jobs WHERE id = $1");
        sqlx::query_as(&query).bind(id).fetch_optional(pool).await
    }

    /// All jobs referencing a step, newest first (inspection and tests).
    pub async fn list_for_step(
        pool: &PgPool,
        run_id: DbId,
        step_index: i16,
    ) -> Result<Vec<QueueJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queue_jobs \
             WHERE run_id = $1 AND step_index = $2 \
             ORDER BY id DESC"
        );
        sqlx::query_as(&query)
            .bind(run_id)
            .bind(step_index)
            .fetch_all(pool)
            .await
    }

    /// Count a run's non-terminal jobs.
    pub async fn count_pending_for_run(
        pool: &PgPool,
        run_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_jobs \
             WHERE run_id = $1 AND state_id IN ($2, $3, $4)",
        )
        .bind(run_id)
        .bind(QueueJobState::Waiting.id())
        .bind(QueueJobState::Delayed.id())
        .bind(QueueJobState::Active.id())
        .fetch_one(pool)
        .await
    }

    /// Dead-lettered jobs for operator inspection, newest first.
    pub async fn list_dead_lettered(pool: &PgPool) -> Result<Vec<QueueJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queue_jobs \
             WHERE dead_lettered ORDER BY updated_at DESC"
        );
        sqlx::query_as(&query).fetch_all(pool).await
    }
}
