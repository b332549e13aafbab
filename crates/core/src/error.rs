//! Domain error taxonomy shared across the engine, API, and worker.

use crate::types::DbId;

/// Errors produced by domain-level operations.
///
/// Validation and lookup errors (`UnknownWorkflowKey`, `ContactNotFound`,
/// `DuplicateActiveRun`) are surfaced synchronously to the enrollment
/// caller and never enter the queue. `InvalidTransition` is how the
/// compare-and-swap persistence layer reports a lost race; the executor
/// treats it as "someone else already handled this".
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested workflow key is not in the registry.
    #[error("Unknown workflow key: {0}")]
    UnknownWorkflowKey(String),

    /// The target contact does not exist in the CRM.
    #[error("Contact {0} not found")]
    ContactNotFound(DbId),

    /// A non-terminal run already exists for this (contact, workflow key).
    #[error("Contact {contact_id} already has an active {workflow_key} run")]
    DuplicateActiveRun {
        contact_id: DbId,
        workflow_key: String,
    },

    /// A state transition was rejected because the stored status is not a
    /// valid predecessor of the target status.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Manual retry was requested for a run that is not in the Failed state.
    #[error("Run {0} is not retryable")]
    RunNotRetryable(DbId),

    /// An entity lookup by ID found nothing.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A request failed input validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}
