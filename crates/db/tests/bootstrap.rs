use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify lookup seed data.
#[sqlx::test(migrations = "../../db/migrations")]
async fn full_bootstrap(pool: PgPool) {
    sendjoy_db::health_check(&pool).await.unwrap();

    // Every status lookup table must exist with five seeded rows,
    // matching the #[repr(i16)] enums in sendjoy-core.
    let tables = ["run_statuses", "step_statuses", "queue_job_states"];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 5, "{table} should have 5 seed rows");
    }
}

/// Seed names line up with the enum discriminants.
#[sqlx::test(migrations = "../../db/migrations")]
async fn status_seed_order_matches_enums(pool: PgPool) {
    let name: (String,) =
        sqlx::query_as("SELECT name FROM run_statuses WHERE id = $1")
            .bind(sendjoy_core::fsm::RunStatus::Cancelled.id())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(name.0, "cancelled");

    let name: (String,) =
        sqlx::query_as("SELECT name FROM step_statuses WHERE id = $1")
            .bind(sendjoy_core::fsm::StepStatus::Executing.id())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(name.0, "executing");

    let name: (String,) =
        sqlx::query_as("SELECT name FROM queue_job_states WHERE id = $1")
            .bind(sendjoy_core::fsm::QueueJobState::Delayed.id())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(name.0, "delayed");
}
