use std::sync::Arc;

use sendjoy_engine::EnrollmentService;
use sendjoy_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: sendjoy_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Enrollment service (validation + atomic run creation).
    pub enrollment: EnrollmentService,
    /// Centralized event bus for publishing workflow lifecycle events.
    pub event_bus: Arc<EventBus>,
}
