//! Operator-triggered run control: manual retry and cancellation.

use chrono::Utc;
use sendjoy_core::fsm::RunStatus;
use sendjoy_core::types::DbId;
use sendjoy_core::CoreError;
use sendjoy_db::models::queue_job::NewQueueJob;
use sendjoy_db::repositories::{QueueJobRepo, WorkflowRunRepo, WorkflowStepRepo};
use sendjoy_db::DbPool;
use sendjoy_events::{EventBus, WorkflowEvent};

use crate::error::EngineError;

/// Manually retry a failed run.
///
/// Only runs in `Failed` are retryable. The run is moved back to
/// `Running` first (claiming the retry against concurrent operators),
/// then the failed step is reset (attempt 0, `Failed -> Scheduled`) and
/// a fresh queue job is enqueued for it at now.
pub async fn retry_run(pool: &DbPool, bus: &EventBus, run_id: DbId) -> Result<(), EngineError> {
    let run = WorkflowRunRepo::find_by_id(pool, run_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        })?;

    if run.status() != Some(RunStatus::Failed) {
        return Err(CoreError::RunNotRetryable(run_id).into());
    }

    let step = WorkflowStepRepo::first_failed(pool, run_id)
        .await?
        .ok_or_else(|| CoreError::Internal(format!("failed run {run_id} has no failed step")))?;

    if !WorkflowRunRepo::transition(pool, run_id, RunStatus::Failed, RunStatus::Running).await? {
        // Another operator won the race.
        return Err(CoreError::RunNotRetryable(run_id).into());
    }

    let now = Utc::now();
    if !WorkflowStepRepo::reset_for_retry(pool, step.id, now).await? {
        return Err(CoreError::Internal(format!(
            "failed step {} of run {run_id} could not be reset",
            step.step_index
        ))
        .into());
    }

    QueueJobRepo::enqueue(
        pool,
        &NewQueueJob {
            run_id,
            step_index: step.step_index,
            kind: step.action.clone(),
            payload: run.payload.clone(),
            not_before: now,
            max_attempts: step.max_attempts,
        },
    )
    .await?;

    tracing::info!(run_id, step_index = step.step_index, "Run manually retried");
    bus.publish(
        WorkflowEvent::new("run.retried")
            .with_run(run_id, run.contact_id)
            .with_payload(serde_json::json!({"step_index": step.step_index})),
    );
    Ok(())
}

/// Cancel a run.
///
/// Applies to `Pending` and `Running` runs; any in-flight or future job
/// becomes a no-op through the executor's stale-job guard. An action
/// already in progress at the gateway is not interrupted; cancellation
/// only prevents future steps.
pub async fn cancel_run(pool: &DbPool, bus: &EventBus, run_id: DbId) -> Result<(), EngineError> {
    let run = WorkflowRunRepo::find_by_id(pool, run_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        })?;

    let status = run
        .status()
        .ok_or_else(|| CoreError::Internal(format!("run {run_id} has unknown status")))?;

    status.validate_transition(RunStatus::Cancelled)?;

    if !WorkflowRunRepo::transition(pool, run_id, status, RunStatus::Cancelled).await? {
        return Err(CoreError::InvalidTransition {
            entity: "run",
            from: status.name(),
            to: RunStatus::Cancelled.name(),
        }
        .into());
    }

    tracing::info!(run_id, "Run cancelled");
    bus.publish(WorkflowEvent::new("run.cancelled").with_run(run_id, run.contact_id));
    Ok(())
}
