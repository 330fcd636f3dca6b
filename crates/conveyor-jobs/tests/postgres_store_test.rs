//! Integration tests for PgJobStore.
//!
//! These tests run against a real PostgreSQL database using testcontainers.
//! Requires Docker; run with `--ignored`.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::TestDatabase;
use conveyor_jobs::{
    HandlerRegistry, JobError, JobId, JobQueue, JobStatus, JobStore, NewJob, Priority,
    WorkerPool, WorkerPoolConfig,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

async fn insert(store: &dyn JobStore, job: NewJob) -> conveyor_jobs::Job {
    let max = job.max_attempts.unwrap_or(3);
    store
        .insert(job, max, Utc::now())
        .await
        .expect("Failed to insert job")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_and_get() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let job = insert(
        &store,
        NewJob::new("export", json!({"x": 1}))
            .priority(Priority::High)
            .metadata(json!({"tenant": "acme"})),
    )
    .await;

    let found = store.get(&job.id).await.expect("Failed to get job");
    assert_eq!(found.job_type, "export");
    assert_eq!(found.payload, json!({"x": 1}));
    assert_eq!(found.status, JobStatus::Pending);
    assert_eq!(found.priority, Priority::High);
    assert_eq!(found.attempts, 0);
    assert_eq!(found.metadata, Some(json!({"tenant": "acme"})));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_order_priority_then_age() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let low = insert(&store, NewJob::new("t", json!({})).priority(Priority::Low)).await;
    let normal = insert(&store, NewJob::new("t", json!({}))).await;
    let critical = insert(&store, NewJob::new("t", json!({})).priority(Priority::Critical)).await;
    let high = insert(&store, NewJob::new("t", json!({})).priority(Priority::High)).await;

    let mut order = Vec::new();
    while let Some(job) = store.claim_next("w1", Utc::now()).await.unwrap() {
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.locked_by.as_deref(), Some("w1"));
        order.push(job.id);
    }

    assert_eq!(order, vec![critical.id, high.id, normal.id, low.id]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_respects_schedule() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let later = Utc::now() + ChronoDuration::seconds(60);
    insert(&store, NewJob::new("t", json!({})).at(later)).await;

    assert!(store.claim_next("w1", Utc::now()).await.unwrap().is_none());
    assert!(store
        .claim_next("w1", later + ChronoDuration::seconds(1))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_claims_never_duplicate() {
    let db = TestDatabase::new().await;
    let store = Arc::new(db.store());

    for _ in 0..40 {
        insert(store.as_ref(), NewJob::new("t", json!({}))).await;
    }

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(job) = store
                .claim_next(&format!("w{}", i), Utc::now())
                .await
                .unwrap()
            {
                ids.push(job.id);
            }
            ids
        }));
    }

    let mut seen: HashSet<JobId> = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "job claimed twice");
        }
    }
    assert_eq!(seen.len(), 40);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_fail_retry_and_terminal() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let job = insert(&store, NewJob::new("export", json!({})).max_attempts(2)).await;
    store.claim_next("w1", Utc::now()).await.unwrap();

    let retry_at = Utc::now() + ChronoDuration::seconds(1);
    let retried = store
        .fail(&job.id, "w1", "boom", Some(retry_at), Utc::now())
        .await
        .unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempts, 1);
    assert!(retried.locked_by.is_none());
    assert!(retried.scheduled_for.unwrap() >= retry_at - ChronoDuration::milliseconds(1));

    store
        .claim_next("w1", retry_at + ChronoDuration::seconds(1))
        .await
        .unwrap()
        .unwrap();

    // Asking for a retry at the ceiling is recorded as terminal.
    let failed = store
        .fail(&job.id, "w1", "boom again", Some(Utc::now()), Utc::now())
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 2);
    assert_eq!(failed.last_error.as_deref(), Some("boom again"));
    assert!(failed.completed_at.is_some());

    assert!(store
        .claim_next("w1", Utc::now() + ChronoDuration::hours(1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_complete_and_cancel_guards() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let job = insert(&store, NewJob::new("t", json!({}))).await;
    store.claim_next("w1", Utc::now()).await.unwrap();

    let err = store.cancel(&job.id, Utc::now()).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidState {
            status: JobStatus::Processing,
            ..
        }
    ));

    let done = store.complete(&job.id, "w1", Utc::now()).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    let again = store.complete(&job.id, "w1", Utc::now()).await.unwrap();
    assert_eq!(again.status, JobStatus::Completed);

    let missing = store
        .cancel(&JobId::from("missing"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(missing, JobError::NotFound(_)));

    let pending = insert(&store, NewJob::new("t", json!({}))).await;
    let cancelled = store.cancel(&pending.id, Utc::now()).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_release_and_recover_stale() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let job = insert(&store, NewJob::new("t", json!({}))).await;
    store
        .claim_next("w1", Utc::now() - ChronoDuration::minutes(30))
        .await
        .unwrap();

    assert!(store.release(&job.id, "w2", Utc::now()).await.unwrap().is_none());

    let recovered = store
        .recover_stale(Utc::now(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].status, JobStatus::Pending);
    assert_eq!(recovered[0].attempts, 1);
    assert_eq!(recovered[0].last_error.as_deref(), Some("lease expired"));

    store.claim_next("w3", Utc::now()).await.unwrap().unwrap();
    let released = store.release(&job.id, "w3", Utc::now()).await.unwrap().unwrap();
    assert_eq!(released.status, JobStatus::Pending);
    assert_eq!(released.attempts, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_write_back_from_previous_lease_holder_is_rejected() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let job = insert(&store, NewJob::new("t", json!({})).max_attempts(3)).await;
    store
        .claim_next("worker-a", Utc::now() - ChronoDuration::seconds(120))
        .await
        .unwrap();
    store
        .recover_stale(Utc::now(), Duration::from_secs(60))
        .await
        .unwrap();
    store.claim_next("worker-b", Utc::now()).await.unwrap().unwrap();

    let err = store
        .complete(&job.id, "worker-a", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidState {
            status: JobStatus::Processing,
            ..
        }
    ));
    let err = store
        .fail(&job.id, "worker-a", "late", Some(Utc::now()), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidState { .. }));

    let current = store.get(&job.id).await.unwrap();
    assert_eq!(current.status, JobStatus::Processing);
    assert_eq!(current.locked_by.as_deref(), Some("worker-b"));
    assert_eq!(current.attempts, 1);

    let done = store.complete(&job.id, "worker-b", Utc::now()).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_listing_and_stats() {
    let db = TestDatabase::new().await;
    let store = db.store();

    let first = insert(&store, NewJob::new("t", json!({}))).await;
    insert(&store, NewJob::new("t", json!({}))).await;
    insert(&store, NewJob::new("t", json!({})).priority(Priority::Critical)).await;
    store.claim_next("w1", Utc::now()).await.unwrap();

    let pending = store.list_pending(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, first.id);
    assert_eq!(store.list_pending(1).await.unwrap().len(), 1);
    assert_eq!(store.list_processing().await.unwrap().len(), 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.total, 3);

    store.health_check().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_worker_pool_against_postgres() {
    let db = TestDatabase::new().await;
    let queue = Arc::new(JobQueue::new(Arc::new(db.store())));

    let mut handlers = HandlerRegistry::new();
    handlers.register("ok", |_payload, _ctx| async { Ok(()) });

    let config = WorkerPoolConfig {
        max_concurrent: 4,
        poll_interval: Duration::from_millis(20),
        ..WorkerPoolConfig::default()
    };
    let pool = WorkerPool::new(queue.clone(), handlers, config);

    for _ in 0..20 {
        queue.enqueue(NewJob::new("ok", json!({}))).await.unwrap();
    }
    pool.start().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(20);
    while queue.stats().await.unwrap().completed < 20 {
        assert!(std::time::Instant::now() < deadline, "jobs did not complete");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pool.shutdown().await.unwrap();
    assert_eq!(pool.jobs_processed(), 20);
}
