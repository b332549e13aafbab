//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Status transitions are
//! compare-and-swap: the `UPDATE` only applies when the stored status
//! equals the expected predecessor, and callers get `false` back when
//! the swap was lost.

pub mod event_repo;
pub mod queue_job_repo;
pub mod workflow_run_repo;
pub mod workflow_step_repo;

pub use event_repo::EventRepo;
pub use queue_job_repo::QueueJobRepo;
pub use workflow_run_repo::WorkflowRunRepo;
pub use workflow_step_repo::WorkflowStepRepo;
