//! Request handlers, one module per resource.

pub mod health;
pub mod queue;
pub mod runs;
pub mod workflows;
