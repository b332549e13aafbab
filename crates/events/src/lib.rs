//! Workflow lifecycle event infrastructure.
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`WorkflowEvent`] — the canonical event envelope (`run.enrolled`,
//!   `step.succeeded`, `run.failed`, ...).
//! - [`EventPersistence`] — background task that durably writes every
//!   event to the `events` table.

pub mod bus;
pub mod persistence;

pub use bus::{EventBus, WorkflowEvent};
pub use persistence::EventPersistence;
