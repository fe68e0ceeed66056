//! Queue contract tests over the in-memory store.
//!
//! Covers idempotent enqueue, claim race safety, the retry-then-terminal
//! ladder, handler timeouts, and drain semantics.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use herald_core::{models::QueueStatus, TestClock};
use herald_queue::{store::mock::MockQueueStore, JobQueue, RunOutcome, DEFAULT_MAX_RETRIES};
use serde_json::json;

fn queue() -> (JobQueue, Arc<MockQueueStore>, Arc<TestClock>) {
    let store = Arc::new(MockQueueStore::new());
    let clock = Arc::new(TestClock::new());
    let queue = JobQueue::new(store.clone(), clock.clone());
    (queue, store, clock)
}

#[tokio::test]
async fn enqueue_with_same_key_returns_same_job() {
    let (queue, store, _clock) = queue();

    let first = queue
        .enqueue("export", json!({"event": "gala"}), Some("abc".into()), DEFAULT_MAX_RETRIES)
        .await
        .unwrap();
    let second = queue
        .enqueue("export", json!({"event": "gala"}), Some("abc".into()), DEFAULT_MAX_RETRIES)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn enqueue_after_completion_creates_fresh_job() {
    let (queue, store, _clock) = queue();

    let first = queue
        .enqueue("export", json!({}), Some("abc".into()), DEFAULT_MAX_RETRIES)
        .await
        .unwrap();
    let claimed = queue.claim_next(None).await.unwrap().unwrap();
    let handler = |_payload: serde_json::Value| async move { Ok::<(), String>(()) };
    queue.run(&claimed, &handler, Duration::from_secs(5)).await.unwrap();

    let second = queue
        .enqueue("export", json!({}), Some("abc".into()), DEFAULT_MAX_RETRIES)
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn claim_is_exclusive_under_concurrency() {
    let (queue, _store, _clock) = queue();

    queue.enqueue("export", json!({}), None, DEFAULT_MAX_RETRIES).await.unwrap();

    let (a, b) = tokio::join!(queue.claim_next(None), queue.claim_next(None));
    let a = a.unwrap();
    let b = b.unwrap();

    // Exactly one caller wins the single queued job.
    assert_ne!(a.is_some(), b.is_some());
}

#[tokio::test]
async fn claim_filters_by_type_and_picks_oldest() {
    let (queue, _store, clock) = queue();

    let older = queue.enqueue("export", json!({}), None, DEFAULT_MAX_RETRIES).await.unwrap();
    clock.advance(Duration::from_secs(1));
    queue.enqueue("cleanup", json!({}), None, DEFAULT_MAX_RETRIES).await.unwrap();
    clock.advance(Duration::from_secs(1));
    queue.enqueue("export", json!({}), None, DEFAULT_MAX_RETRIES).await.unwrap();

    let claimed = queue.claim_next(Some("export")).await.unwrap().unwrap();

    assert_eq!(claimed.id, older);
    assert_eq!(claimed.job_type, "export");
}

#[tokio::test]
async fn failures_retry_then_go_terminal() {
    let (queue, store, _clock) = queue();

    let id = queue.enqueue("export", json!({}), None, 2).await.unwrap();
    let failing = |_payload: serde_json::Value| async move { Err::<(), String>("provider down".to_string()) };

    // First failure: back to queued with retry_count 1.
    let job = queue.claim_next(None).await.unwrap().unwrap();
    let outcome = queue.run(&job, &failing, Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome, RunOutcome::Retried { retry_count: 1 });
    let row = store.job(id).await.unwrap();
    assert_eq!(row.status, QueueStatus::Queued);
    assert_eq!(row.retry_count, 1);

    // Second failure: retry_count 2.
    let job = queue.claim_next(None).await.unwrap().unwrap();
    let outcome = queue.run(&job, &failing, Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome, RunOutcome::Retried { retry_count: 2 });
    let row = store.job(id).await.unwrap();
    assert_eq!(row.status, QueueStatus::Queued);
    assert_eq!(row.retry_count, 2);

    // Third failure exhausts the budget.
    let job = queue.claim_next(None).await.unwrap().unwrap();
    let outcome = queue.run(&job, &failing, Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);
    let row = store.job(id).await.unwrap();
    assert_eq!(row.status, QueueStatus::Failed);
    assert_eq!(row.error_message.as_deref(), Some("provider down"));
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn success_marks_done_and_clears_error() {
    let (queue, store, _clock) = queue();

    let id = queue.enqueue("export", json!({"n": 1}), None, DEFAULT_MAX_RETRIES).await.unwrap();
    let job = queue.claim_next(None).await.unwrap().unwrap();
    let handler = |payload: serde_json::Value| async move {
        assert_eq!(payload["n"], 1);
        Ok::<(), String>(())
    };

    let outcome = queue.run(&job, &handler, Duration::from_secs(5)).await.unwrap();

    assert_eq!(outcome, RunOutcome::Done);
    let row = store.job(id).await.unwrap();
    assert_eq!(row.status, QueueStatus::Done);
    assert!(row.completed_at.is_some());
}

#[tokio::test]
async fn hung_handler_counts_as_failure() {
    let (queue, store, _clock) = queue();

    let id = queue.enqueue("export", json!({}), None, 0).await.unwrap();
    let job = queue.claim_next(None).await.unwrap().unwrap();
    let hung = |_payload: serde_json::Value| async move {
        // Never resolves; the virtual-time timer must win the race.
        std::future::pending::<()>().await;
        Ok::<(), String>(())
    };

    let outcome = queue.run(&job, &hung, Duration::from_millis(100)).await.unwrap();

    assert_eq!(outcome, RunOutcome::Failed);
    let row = store.job(id).await.unwrap();
    assert!(row.error_message.unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn drain_stops_when_queue_is_empty() {
    let (queue, store, _clock) = queue();

    for i in 0..3 {
        queue.enqueue("export", json!({"i": i}), None, DEFAULT_MAX_RETRIES).await.unwrap();
    }

    let counter = Arc::new(AtomicU32::new(0));
    let seen = counter.clone();
    let handler = move |_payload: serde_json::Value| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        }
    };

    let ran = queue
        .drain("export", &handler, 10, Duration::from_secs(5), Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(ran, 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn drain_respects_max_jobs() {
    let (queue, _store, _clock) = queue();

    for _ in 0..5 {
        queue.enqueue("export", json!({}), None, DEFAULT_MAX_RETRIES).await.unwrap();
    }

    let handler = |_payload: serde_json::Value| async move { Ok::<(), String>(()) };
    let ran = queue
        .drain("export", &handler, 2, Duration::from_secs(5), Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(ran, 2);
    assert!(queue.claim_next(Some("export")).await.unwrap().is_some());
}
