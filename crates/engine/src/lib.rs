//! The workflow automation engine.
//!
//! Glue between the registry ([`sendjoy_core::workflow`]), the run state
//! store ([`sendjoy_db`]), and the durable job queue:
//!
//! - [`enroll::EnrollmentService`] — validates enrollment requests and
//!   atomically creates a run, its steps, and step 0's queue job.
//! - [`executor::StepExecutor`] — the queue worker: claims due jobs,
//!   performs step actions through the delivery provider, and advances
//!   or fails runs.
//! - [`control`] — operator-triggered manual retry and cancellation.
//! - [`delivery`] / [`contacts`] — the external collaborator seams.

pub mod contacts;
pub mod control;
pub mod delivery;
pub mod enroll;
pub mod error;
pub mod executor;

pub use contacts::{ContactDirectory, PgContactDirectory};
pub use delivery::{DeliveryError, DeliveryProvider, GatewayDelivery};
pub use enroll::{EnrollRequest, EnrollmentService};
pub use error::EngineError;
pub use executor::{ExecutorConfig, StepExecutor};
