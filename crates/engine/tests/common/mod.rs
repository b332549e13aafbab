//! Shared harness for engine integration tests: a scripted in-memory
//! delivery provider plus setup helpers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sendjoy_core::types::DbId;
use sendjoy_core::workflow::ActionKind;
use sendjoy_db::DbPool;
use sendjoy_engine::{
    DeliveryError, DeliveryProvider, EnrollmentService, ExecutorConfig, PgContactDirectory,
    StepExecutor,
};
use sendjoy_events::EventBus;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// FakeDelivery
// ---------------------------------------------------------------------------

/// Scripted outcome for one delivery call.
#[derive(Debug, Clone, Copy)]
pub enum SendOutcome {
    Ok,
    Transient,
    Permanent,
}

/// In-memory delivery provider. Pops outcomes from a script (defaulting
/// to success once the script is exhausted) and records every send.
pub struct FakeDelivery {
    script: Mutex<VecDeque<SendOutcome>>,
    sends: Mutex<Vec<(DbId, ActionKind)>>,
}

impl FakeDelivery {
    /// A provider whose every send succeeds.
    pub fn succeeding() -> Arc<Self> {
        Self::scripted([])
    }

    /// A provider following the given outcome script, then succeeding.
    pub fn scripted(outcomes: impl IntoIterator<Item = SendOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            sends: Mutex::new(Vec::new()),
        })
    }

    /// How many delivery calls were made.
    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    /// The actions delivered, in call order.
    pub fn actions(&self) -> Vec<ActionKind> {
        self.sends.lock().unwrap().iter().map(|(_, a)| *a).collect()
    }
}

#[async_trait]
impl DeliveryProvider for FakeDelivery {
    async fn send(
        &self,
        contact_id: DbId,
        action: ActionKind,
        _payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        self.sends.lock().unwrap().push((contact_id, action));
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Ok);
        match outcome {
            SendOutcome::Ok => Ok(()),
            SendOutcome::Transient => Err(DeliveryError::Transient("gateway unavailable".into())),
            SendOutcome::Permanent => Err(DeliveryError::Permanent("number rejected".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

/// Build the enrollment service and executor wired to the test pool, the
/// real Postgres contact directory, and the given fake delivery.
pub fn engine(
    pool: &DbPool,
    delivery: Arc<FakeDelivery>,
) -> (EnrollmentService, StepExecutor, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let contacts = Arc::new(PgContactDirectory::new(pool.clone()));
    let service = EnrollmentService::new(pool.clone(), contacts, bus.clone());
    let executor = StepExecutor::new(
        pool.clone(),
        delivery,
        bus.clone(),
        ExecutorConfig::default(),
    );
    (service, executor, bus)
}

/// Insert a contact row and return its ID.
pub async fn insert_contact(pool: &PgPool, name: &str) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO contacts (full_name, phone) VALUES ($1, '+15550100') RETURNING id",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Make every pending queue job immediately claimable, collapsing
/// backoff and drip delays so tests don't wait on wall-clock time.
pub async fn force_due(pool: &PgPool) {
    sqlx::query("UPDATE queue_jobs SET not_before = NOW() WHERE state_id IN (1, 2)")
        .execute(pool)
        .await
        .unwrap();
}
