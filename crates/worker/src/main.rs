//! The step-executor worker binary.
//!
//! Polls the durable job queue and performs step actions through the
//! message gateway. Run any number of these; the queue's lease claims
//! keep workers from stepping on each other.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sendjoy_engine::{ExecutorConfig, GatewayDelivery, StepExecutor};
use sendjoy_events::{EventBus, EventPersistence};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sendjoy_worker=debug,sendjoy_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sendjoy_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    sendjoy_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    tokio::spawn(EventPersistence::run(pool.clone(), event_bus.subscribe()));

    // --- Executor ---
    let config = ExecutorConfig::from_env();
    let delivery = Arc::new(GatewayDelivery::from_env());
    let executor = StepExecutor::new(pool, delivery, event_bus, config);

    // --- Shutdown wiring ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    executor.run(cancel).await;
}
