//! Domain logic for the sendjoy workflow automation engine.
//!
//! This crate has zero internal dependencies so it can be used by the
//! persistence layer, the engine, the API server, and the worker binary
//! alike. It contains:
//!
//! - [`types`] — shared ID and timestamp aliases.
//! - [`error`] — the domain error taxonomy.
//! - [`workflow`] — the static workflow registry: keys, step definitions,
//!   retry policies, and backoff schedules.
//! - [`fsm`] — explicit state machines for runs, steps, and queue jobs.

pub mod error;
pub mod fsm;
pub mod types;
pub mod workflow;

pub use error::CoreError;
