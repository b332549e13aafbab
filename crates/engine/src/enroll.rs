//! Enrollment: create a run with its steps and schedule the first job.

use std::sync::Arc;

use chrono::Utc;
use sendjoy_core::types::{DbId, Timestamp};
use sendjoy_core::workflow::{self, WorkflowKey};
use sendjoy_core::CoreError;
use sendjoy_db::models::run::{NewRun, WorkflowRun};
use sendjoy_db::models::step::NewStep;
use sendjoy_db::repositories::WorkflowRunRepo;
use sendjoy_db::DbPool;
use sendjoy_events::{EventBus, WorkflowEvent};
use serde::Deserialize;

use crate::contacts::ContactDirectory;
use crate::error::EngineError;

/// An enrollment request, as received from the API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    pub contact_id: DbId,
    pub workflow_key: String,
    /// When the run's first action should fire; `None` means now.
    pub run_at: Option<Timestamp>,
    /// Opaque action parameters (e.g. a media URL) carried to every step.
    pub payload: Option<serde_json::Value>,
}

/// Validates enrollment requests and creates runs.
///
/// Cheaply cloneable; the API server keeps one in its shared state.
#[derive(Clone)]
pub struct EnrollmentService {
    pool: DbPool,
    contacts: Arc<dyn ContactDirectory>,
    bus: Arc<EventBus>,
}

impl EnrollmentService {
    pub fn new(pool: DbPool, contacts: Arc<dyn ContactDirectory>, bus: Arc<EventBus>) -> Self {
        Self {
            pool,
            contacts,
            bus,
        }
    }

    /// Enroll a contact into a workflow.
    ///
    /// Validation failures (`UnknownWorkflowKey`, `ContactNotFound`,
    /// `DuplicateActiveRun`) surface synchronously; nothing reaches the
    /// queue. On success exactly one queue job exists (step 0) and the
    /// run is `Running`. Delivery always happens asynchronously, so the
    /// caller never blocks on gateway latency.
    pub async fn enroll(&self, request: &EnrollRequest) -> Result<WorkflowRun, EngineError> {
        let key: WorkflowKey = request.workflow_key.parse().map_err(CoreError::from)?;

        if !self.contacts.exists(request.contact_id).await? {
            return Err(CoreError::ContactNotFound(request.contact_id).into());
        }

        if WorkflowRunRepo::has_active(&self.pool, request.contact_id, key.as_str()).await? {
            return Err(duplicate_active(request.contact_id, key).into());
        }

        let definition = workflow::definition_for(key);
        let scheduled_at = request.run_at.unwrap_or_else(Utc::now);
        let payload = request
            .payload
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        let new_run = NewRun {
            contact_id: request.contact_id,
            workflow_key: key.as_str().to_string(),
            scheduled_at,
            payload,
        };
        let steps: Vec<NewStep> = definition
            .iter()
            .enumerate()
            .map(|(index, def)| NewStep {
                step_index: index as i16,
                action: def.action.as_str().to_string(),
                max_attempts: def.retry.max_attempts,
            })
            .collect();

        let step0_due = scheduled_at
            + chrono::Duration::from_std(definition[0].delay).unwrap_or_else(|_| chrono::Duration::zero());

        let run = WorkflowRunRepo::create_with_steps(&self.pool, &new_run, &steps, step0_due)
            .await
            .map_err(|e| classify_create_error(e, request.contact_id, key))?;

        tracing::info!(
            run_id = run.id,
            contact_id = run.contact_id,
            workflow_key = %key,
            scheduled_at = %scheduled_at,
            "Contact enrolled",
        );

        self.bus.publish(
            WorkflowEvent::new("run.enrolled")
                .with_run(run.id, run.contact_id)
                .with_payload(serde_json::json!({
                    "workflow_key": key.as_str(),
                    "scheduled_at": scheduled_at,
                })),
        );

        Ok(run)
    }
}

fn duplicate_active(contact_id: DbId, key: WorkflowKey) -> CoreError {
    CoreError::DuplicateActiveRun {
        contact_id,
        workflow_key: key.as_str().to_string(),
    }
}

/// Map the unique-index backstop onto the domain error.
///
/// Two concurrent enrollments can both pass the `has_active` pre-check;
/// the partial unique index on (contact_id, workflow_key) then rejects
/// the loser with a 23505 on `uq_workflow_runs_active`.
fn classify_create_error(err: sqlx::Error, contact_id: DbId, key: WorkflowKey) -> EngineError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("uq_workflow_runs_active") {
            return duplicate_active(contact_id, key).into();
        }
    }
    EngineError::Persistence(err)
}
