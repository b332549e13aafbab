//! Engine-level error type.

use sendjoy_core::CoreError;

/// Errors returned by the enrollment service and control operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error (validation, lookup, invalid transition).
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// A database failure. Enrollment reports this to the caller; the
    /// executor instead leaves the job for queue-level redelivery.
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}
