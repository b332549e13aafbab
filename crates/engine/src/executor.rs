//! The queue worker: claims due jobs and drives steps through their
//! lifecycle.
//!
//! Cross-worker coordination happens entirely through the queue's lease
//! claims and the store's compare-and-swap transitions; the executor
//! holds no in-process locks. A lost swap means another worker (or a
//! cancellation) got there first, and the job is discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sendjoy_core::fsm::RunStatus;
use sendjoy_core::types::Timestamp;
use sendjoy_core::workflow::{self, ActionKind, StepDefinition, WorkflowKey};
use sendjoy_db::models::queue_job::{NewQueueJob, QueueJob};
use sendjoy_db::models::run::WorkflowRun;
use sendjoy_db::models::step::WorkflowStep;
use sendjoy_db::repositories::{QueueJobRepo, WorkflowRunRepo, WorkflowStepRepo};
use sendjoy_db::DbPool;
use sendjoy_events::{EventBus, WorkflowEvent};
use tokio_util::sync::CancellationToken;

use crate::delivery::{DeliveryError, DeliveryProvider};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Default polling interval for the executor loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default lease duration for a claimed job.
const DEFAULT_LEASE_SECS: f64 = 300.0;

/// Default bound on a single delivery call.
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default queue-level redelivery bound before dead-lettering.
const DEFAULT_REDELIVERY_LIMIT: i32 = 3;

/// Tunables for the executor loop.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How often to poll for due jobs.
    pub poll_interval: Duration,
    /// Lease granted on claim; an expired lease means the worker died.
    pub lease_secs: f64,
    /// Upper bound on one delivery call; elapsing counts as transient.
    pub delivery_timeout: Duration,
    /// Deliveries of one job before it is dead-lettered.
    pub redelivery_limit: i32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease_secs: DEFAULT_LEASE_SECS,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            redelivery_limit: DEFAULT_REDELIVERY_LIMIT,
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `WORKER_POLL_INTERVAL_MS` | `1000`  |
    /// | `WORKER_LEASE_SECS`       | `300`   |
    /// | `DELIVERY_TIMEOUT_SECS`   | `30`    |
    /// | `QUEUE_REDELIVERY_LIMIT`  | `3`     |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let lease_secs = std::env::var("WORKER_LEASE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.lease_secs);

        let delivery_timeout = std::env::var("DELIVERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.delivery_timeout);

        let redelivery_limit = std::env::var("QUEUE_REDELIVERY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.redelivery_limit);

        Self {
            poll_interval,
            lease_secs,
            delivery_timeout,
            redelivery_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// Outcome of performing a step's action.
enum ActionOutcome {
    Succeeded,
    Retry(String),
    Exhausted(String),
}

/// Long-lived worker task processing the durable job queue.
pub struct StepExecutor {
    pool: DbPool,
    delivery: Arc<dyn DeliveryProvider>,
    bus: Arc<EventBus>,
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(
        pool: DbPool,
        delivery: Arc<dyn DeliveryProvider>,
        bus: Arc<EventBus>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pool,
            delivery,
            bus,
            config,
        }
    }

    /// Run the executor loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            lease_secs = self.config.lease_secs,
            "Step executor started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Step executor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll cycle: reap expired leases, then drain all due jobs.
    pub async fn tick(&self) {
        match QueueJobRepo::reap_expired_leases(&self.pool, self.config.redelivery_limit).await {
            Ok((0, 0)) => {}
            Ok((reclaimed, dead_lettered)) => {
                tracing::warn!(reclaimed, dead_lettered, "Reclaimed expired job leases");
            }
            Err(e) => {
                tracing::error!(error = %e, "Lease reaping failed");
            }
        }

        loop {
            match QueueJobRepo::claim_due(&self.pool, self.config.lease_secs).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process(&job).await {
                        tracing::error!(
                            job_id = job.id,
                            run_id = job.run_id,
                            error = %e,
                            "Job processing failed, leaving for redelivery",
                        );
                        self.redeliver_or_dead_letter(&job, &e.to_string()).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Claim query failed");
                    break;
                }
            }
        }
    }

    /// Process one claimed job to completion.
    ///
    /// Any `Err` here is a persistence problem: the caller releases the
    /// job for queue-level redelivery, distinct from step-level retry.
    async fn process(&self, job: &QueueJob) -> Result<(), sqlx::Error> {
        // Stale-job guard: the run may have been cancelled (or purged)
        // after this job was enqueued.
        let Some(run) = WorkflowRunRepo::find_by_id(&self.pool, job.run_id).await? else {
            return self.discard(job, "run no longer exists").await;
        };
        if run.status() != Some(RunStatus::Running) {
            return self.discard(job, "run is not running").await;
        }

        let Some(step) = WorkflowStepRepo::find(&self.pool, job.run_id, job.step_index).await?
        else {
            return self.discard(job, "step no longer exists").await;
        };

        // CAS Scheduled -> Executing; a lost swap means another worker
        // (or an operator retry) already owns this step.
        let Some(executing) = WorkflowStepRepo::begin_attempt(&self.pool, step.id).await? else {
            return self.discard(job, "step already handled").await;
        };

        tracing::debug!(
            run_id = run.id,
            step_index = executing.step_index,
            attempt = executing.attempt,
            action = %executing.action,
            "Executing step",
        );

        match self.perform(&run, &executing).await {
            ActionOutcome::Succeeded => self.complete_step(job, &run, &executing).await,
            ActionOutcome::Retry(error) => self.retry_step(job, &run, &executing, &error).await,
            ActionOutcome::Exhausted(error) => self.fail_step(job, &run, &executing, &error).await,
        }
    }

    /// Perform the step's action and classify the outcome against the
    /// step's remaining retry budget.
    async fn perform(&self, run: &WorkflowRun, step: &WorkflowStep) -> ActionOutcome {
        let action: ActionKind = match step.action.parse() {
            Ok(action) => action,
            Err(_) => {
                return ActionOutcome::Exhausted(format!("unknown action kind: {}", step.action));
            }
        };

        let result = match action {
            // A wait marker succeeds without touching the gateway; the
            // delay itself lives on the job's not_before.
            ActionKind::Wait => Ok(()),
            ActionKind::SendMessage | ActionKind::SendMedia => {
                match tokio::time::timeout(
                    self.config.delivery_timeout,
                    self.delivery.send(run.contact_id, action, &run.payload),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Transient("delivery timed out".into())),
                }
            }
        };

        match result {
            Ok(()) => ActionOutcome::Succeeded,
            Err(DeliveryError::Transient(msg)) if step.attempt < step.max_attempts => {
                ActionOutcome::Retry(msg)
            }
            Err(e) => ActionOutcome::Exhausted(e.to_string()),
        }
    }

    /// Success path: record the outcome durably, then schedule the next
    /// step or complete the run. The next step's job is only created
    /// after this step's success is committed, which is what guarantees
    /// strict in-order execution per run.
    async fn complete_step(
        &self,
        job: &QueueJob,
        run: &WorkflowRun,
        step: &WorkflowStep,
    ) -> Result<(), sqlx::Error> {
        if !WorkflowStepRepo::mark_succeeded(&self.pool, step.id).await? {
            tracing::warn!(
                run_id = run.id,
                step_index = step.step_index,
                "Step success swap lost; discarding job",
            );
            return self.discard(job, "success swap lost").await;
        }

        self.bus.publish(
            WorkflowEvent::new("step.succeeded")
                .with_run(run.id, run.contact_id)
                .with_payload(serde_json::json!({"step_index": step.step_index})),
        );

        let next_index = step.step_index + 1;
        match definition_step(run, next_index) {
            Some(next_def) => {
                let due = Utc::now()
                    + chrono::Duration::from_std(next_def.delay)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                self.schedule_next(run, next_index, next_def, due).await?;
            }
            None => {
                if WorkflowRunRepo::transition(
                    &self.pool,
                    run.id,
                    RunStatus::Running,
                    RunStatus::Completed,
                )
                .await?
                {
                    tracing::info!(run_id = run.id, "Run completed");
                    self.bus.publish(
                        WorkflowEvent::new("run.completed").with_run(run.id, run.contact_id),
                    );
                }
            }
        }

        QueueJobRepo::complete(&self.pool, job.id).await?;
        Ok(())
    }

    /// Mark the next step scheduled and enqueue exactly one job for it.
    async fn schedule_next(
        &self,
        run: &WorkflowRun,
        next_index: i16,
        next_def: &StepDefinition,
        due: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let Some(next_step) = WorkflowStepRepo::find(&self.pool, run.id, next_index).await? else {
            tracing::error!(run_id = run.id, next_index, "Next step row missing");
            return Ok(());
        };

        if !WorkflowStepRepo::schedule(&self.pool, next_step.id, due).await? {
            // Lost swap: the run was retried/cancelled concurrently and
            // someone else scheduled (or will schedule) this step.
            tracing::warn!(
                run_id = run.id,
                next_index,
                "Next step schedule swap lost; not enqueueing",
            );
            return Ok(());
        }

        QueueJobRepo::enqueue(
            &self.pool,
            &NewQueueJob {
                run_id: run.id,
                step_index: next_index,
                kind: next_def.action.as_str().to_string(),
                payload: run.payload.clone(),
                not_before: due,
                max_attempts: next_def.retry.max_attempts,
            },
        )
        .await?;

        tracing::debug!(
            run_id = run.id,
            step_index = next_index,
            due = %due,
            "Next step scheduled",
        );
        Ok(())
    }

    /// Transient failure with budget left: back off and re-enqueue the
    /// same step. The step returns to Scheduled; this is a retry, not a
    /// terminal failure.
    async fn retry_step(
        &self,
        job: &QueueJob,
        run: &WorkflowRun,
        step: &WorkflowStep,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        let backoff = definition_step(run, step.step_index)
            .map(|def| def.retry.backoff(step.attempt))
            .unwrap_or(Duration::from_secs(60));
        let due =
            Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());

        WorkflowStepRepo::reschedule(&self.pool, step.id, due, error).await?;
        QueueJobRepo::retry_delayed(&self.pool, job.id, due, error).await?;

        tracing::warn!(
            run_id = run.id,
            step_index = step.step_index,
            attempt = step.attempt,
            max_attempts = step.max_attempts,
            backoff_secs = backoff.as_secs(),
            error,
            "Step attempt failed, retrying",
        );
        Ok(())
    }

    /// Terminal failure: the step and its run both fail; later steps are
    /// never scheduled. The run stays queryable with the error retained.
    async fn fail_step(
        &self,
        job: &QueueJob,
        run: &WorkflowRun,
        step: &WorkflowStep,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        WorkflowStepRepo::mark_failed(&self.pool, step.id, error).await?;
        WorkflowRunRepo::transition(&self.pool, run.id, RunStatus::Running, RunStatus::Failed)
            .await?;
        QueueJobRepo::fail(&self.pool, job.id, error, false).await?;

        tracing::error!(
            run_id = run.id,
            step_index = step.step_index,
            attempt = step.attempt,
            error,
            "Step failed terminally, run failed",
        );
        self.bus.publish(
            WorkflowEvent::new("run.failed")
                .with_run(run.id, run.contact_id)
                .with_payload(serde_json::json!({
                    "step_index": step.step_index,
                    "error": error,
                })),
        );
        Ok(())
    }

    /// Stale-job guard: ack the job without touching run or step state.
    async fn discard(&self, job: &QueueJob, reason: &str) -> Result<(), sqlx::Error> {
        tracing::debug!(
            job_id = job.id,
            run_id = job.run_id,
            step_index = job.step_index,
            reason,
            "Discarding stale job",
        );
        QueueJobRepo::complete(&self.pool, job.id).await?;
        Ok(())
    }

    /// Queue-level redelivery for processing (persistence) errors.
    async fn redeliver_or_dead_letter(&self, job: &QueueJob, error: &str) {
        let result = if job.dequeue_count >= self.config.redelivery_limit {
            tracing::error!(job_id = job.id, run_id = job.run_id, "Dead-lettering job");
            QueueJobRepo::fail(&self.pool, job.id, error, true).await
        } else {
            QueueJobRepo::release(&self.pool, job.id, error).await
        };

        if let Err(e) = result {
            // The lease reaper will pick the job up once the lease lapses.
            tracing::error!(job_id = job.id, error = %e, "Failed to release job");
        }
    }
}

/// Resolve a step definition from a run's stored workflow key.
fn definition_step(run: &WorkflowRun, index: i16) -> Option<&'static StepDefinition> {
    let key: WorkflowKey = run.workflow_key.parse().ok()?;
    workflow::definition_for(key).get(index as usize)
}
