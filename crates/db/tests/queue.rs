//! Integration tests for the durable job queue.
//!
//! Covers delayed visibility, FIFO claim order, lease reclamation,
//! dead-lettering, and the state counts used by operator tooling.

use chrono::{Duration, DurationRound, Utc};
use sendjoy_core::fsm::QueueJobState;
use sqlx::PgPool;

use sendjoy_db::models::queue_job::NewQueueJob;
use sendjoy_db::repositories::QueueJobRepo;

const LEASE_SECS: f64 = 300.0;

fn send_job(run_id: i64, step_index: i16, not_before: chrono::DateTime<chrono::Utc>) -> NewQueueJob {
    NewQueueJob {
        run_id,
        step_index,
        kind: "SEND_MEDIA".to_string(),
        payload: serde_json::json!({"media_url": "https://cdn.example/a.mp4"}),
        not_before,
        max_attempts: 3,
    }
}

// ---------------------------------------------------------------------------
// Enqueue / claim
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn due_jobs_enqueue_as_waiting(pool: PgPool) {
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();
    assert_eq!(job.state(), Some(QueueJobState::Waiting));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn future_jobs_enqueue_as_delayed_and_are_not_claimable(pool: PgPool) {
    // Truncate to microseconds so the value round-trips through
    // timestamptz unchanged.
    let not_before = (Utc::now() + Duration::days(30))
        .duration_trunc(Duration::microseconds(1))
        .unwrap();
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, not_before)).await.unwrap();
    assert_eq!(job.state(), Some(QueueJobState::Delayed));
    assert_eq!(job.not_before, not_before);

    assert!(QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_is_fifo_for_equal_due_times(pool: PgPool) {
    let due = Utc::now() - Duration::seconds(5);
    let first = QueueJobRepo::enqueue(&pool, &send_job(1, 0, due)).await.unwrap();
    let second = QueueJobRepo::enqueue(&pool, &send_job(2, 0, due)).await.unwrap();

    let claimed = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.state(), Some(QueueJobState::Active));
    assert_eq!(claimed.dequeue_count, 1);
    assert!(claimed.lease_expires_at.is_some());

    let claimed = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);

    // Queue drained.
    assert!(QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn earlier_due_time_wins_over_insertion_order(pool: PgPool) {
    let later = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();
    let earlier = QueueJobRepo::enqueue(
        &pool,
        &send_job(2, 0, Utc::now() - Duration::minutes(10)),
    )
    .await
    .unwrap();

    let claimed = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert_eq!(claimed.id, earlier.id);

    let claimed = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert_eq!(claimed.id, later.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn active_jobs_are_invisible_to_other_claims(pool: PgPool) {
    QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();

    let first = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap();
    assert!(first.is_some());

    // The lease is held; a second worker sees nothing.
    assert!(QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Ack / retry / release
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_acks_only_active_jobs(pool: PgPool) {
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();

    // Not yet claimed: the ack loses the swap.
    assert!(!QueueJobRepo::complete(&pool, job.id).await.unwrap());

    QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert!(QueueJobRepo::complete(&pool, job.id).await.unwrap());

    let job = QueueJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.state(), Some(QueueJobState::Completed));
    assert!(job.lease_expires_at.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_delayed_backs_off_and_increments_attempt(pool: PgPool) {
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();
    QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();

    let due = Utc::now() + Duration::seconds(60);
    assert!(QueueJobRepo::retry_delayed(&pool, job.id, due, "gateway timeout")
        .await
        .unwrap());

    let job = QueueJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.state(), Some(QueueJobState::Delayed));
    assert_eq!(job.attempt, 1);
    assert_eq!(job.last_error.as_deref(), Some("gateway timeout"));
    assert!(job.claimed_at.is_none());

    // Backoff in the future: not claimable yet.
    assert!(QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn released_jobs_are_immediately_reclaimable(pool: PgPool) {
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();
    QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();

    assert!(QueueJobRepo::release(&pool, job.id, "pool timeout").await.unwrap());

    let reclaimed = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.dequeue_count, 2);
}

// ---------------------------------------------------------------------------
// Lease reaping / dead-lettering
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_leases_are_reclaimed(pool: PgPool) {
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();

    // Claim with an already-expired lease to simulate a crashed worker.
    QueueJobRepo::claim_due(&pool, -1.0).await.unwrap().unwrap();

    let (reclaimed, dead) = QueueJobRepo::reap_expired_leases(&pool, 3).await.unwrap();
    assert_eq!((reclaimed, dead), (1, 0));

    let job = QueueJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.state(), Some(QueueJobState::Waiting));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn repeatedly_reclaimed_jobs_are_dead_lettered(pool: PgPool) {
    let job = QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();

    // Three crashed deliveries with a redelivery limit of 3.
    for _ in 0..2 {
        QueueJobRepo::claim_due(&pool, -1.0).await.unwrap().unwrap();
        let (reclaimed, dead) = QueueJobRepo::reap_expired_leases(&pool, 3).await.unwrap();
        assert_eq!((reclaimed, dead), (1, 0));
    }
    QueueJobRepo::claim_due(&pool, -1.0).await.unwrap().unwrap();
    let (reclaimed, dead) = QueueJobRepo::reap_expired_leases(&pool, 3).await.unwrap();
    assert_eq!((reclaimed, dead), (0, 1));

    let job = QueueJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.state(), Some(QueueJobState::Failed));
    assert!(job.dead_lettered);

    let parked = QueueJobRepo::list_dead_lettered(&pool).await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].id, job.id);
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn counts_by_state_reports_every_bucket(pool: PgPool) {
    // waiting
    QueueJobRepo::enqueue(&pool, &send_job(1, 0, Utc::now())).await.unwrap();
    // delayed
    QueueJobRepo::enqueue(&pool, &send_job(2, 0, Utc::now() + Duration::days(1)))
        .await
        .unwrap();
    // active
    QueueJobRepo::enqueue(&pool, &send_job(3, 0, Utc::now() - Duration::minutes(1)))
        .await
        .unwrap();
    let active = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    assert_eq!(active.run_id, 3);
    // completed
    QueueJobRepo::enqueue(&pool, &send_job(4, 0, Utc::now() - Duration::minutes(2)))
        .await
        .unwrap();
    let done = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    QueueJobRepo::complete(&pool, done.id).await.unwrap();
    // failed
    QueueJobRepo::enqueue(&pool, &send_job(5, 0, Utc::now() - Duration::minutes(3)))
        .await
        .unwrap();
    let failed = QueueJobRepo::claim_due(&pool, LEASE_SECS).await.unwrap().unwrap();
    QueueJobRepo::fail(&pool, failed.id, "permanent: bad number", false)
        .await
        .unwrap();

    let counts = QueueJobRepo::counts_by_state(&pool).await.unwrap();
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.delayed, 1);
    assert_eq!(counts.active, 1);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
}
