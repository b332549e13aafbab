//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the enrollment
//! service, the executor, and the persistence task. Publishing never
//! blocks; slow subscribers lag and drop rather than backpressure the
//! engine.

use chrono::{DateTime, Utc};
use sendjoy_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// WorkflowEvent
// ---------------------------------------------------------------------------

/// A lifecycle event emitted by the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Dot-separated event name, e.g. `"run.enrolled"` or `"step.failed"`.
    pub event_type: String,

    /// The run this event belongs to.
    pub run_id: Option<DbId>,

    /// The contact the run targets.
    pub contact_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data
    /// (step index, error message, workflow key, ...).
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            run_id: None,
            contact_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the run (and its contact) to the event.
    pub fn with_run(mut self, run_id: DbId, contact_id: DbId) -> Self {
        self.run_id = Some(run_id);
        self.contact_id = Some(contact_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`WorkflowEvent`].
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// A bus with no subscribers drops the event silently; publishing is
    /// fire-and-forget by design of the underlying channel.
    pub fn publish(&self, event: WorkflowEvent) {
        let receivers = self.sender.receiver_count();
        if let Err(e) = self.sender.send(event) {
            tracing::debug!(receivers, event_type = %e.0.event_type, "Event dropped (no subscribers)");
        }
    }

    /// Create a new subscription receiving all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
