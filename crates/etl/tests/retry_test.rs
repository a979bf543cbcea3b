//! Retry executor behavior against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use cocho_core::backoff::RetryConfig;
use cocho_core::classify::ErrorKind;
use cocho_etl::error::EtlError;
use cocho_etl::pg::ENTITY_SOURCE_FILE;
use cocho_etl::retry::{EntityRef, RetryExecutor, RetryResult};
use cocho_etl::store::RetryStateStore;
use cocho_etl::testing::MemStore;

const ORG: i64 = 1;

fn executor(store: &Arc<MemStore>, max_retries: u32) -> RetryExecutor<MemStore> {
    RetryExecutor::new(
        Arc::clone(store),
        RetryConfig {
            max_retries,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter_enabled: false,
            ..RetryConfig::default()
        },
    )
}

fn entity(file_id: i64) -> EntityRef<'static> {
    EntityRef {
        entity_type: ENTITY_SOURCE_FILE,
        entity_id: file_id,
        organization_id: ORG,
    }
}

// -- success paths --

#[tokio::test]
async fn first_attempt_success_needs_no_retry() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let exec = executor(&store, 3);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || async {
            Ok::<_, EtlError>(42)
        })
        .await;

    assert_matches!(result, RetryResult::Success { value: 42, attempts: 1 });
    assert_eq!(store.dead_letter_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_and_resets_counter() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let exec = executor(&store, 3);
    let calls = AtomicUsize::new(0);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EtlError::Storage("connection reset by peer".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

    assert_matches!(result, RetryResult::Success { value: "ok", attempts: 3 });
    // Counter was persisted during the retries, then reset on success.
    let stored = store.files.lock().unwrap().get(&file.id).unwrap().clone();
    assert_eq!(stored.retry_count, 0);
    assert!(stored.next_retry_at.is_none());
    assert_eq!(store.dead_letter_count(), 0);
}

// -- exhaustion --

#[tokio::test(start_paused = true)]
async fn exhausted_budget_writes_exactly_one_dead_letter() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let exec = executor(&store, 3);
    let calls = AtomicUsize::new(0);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EtlError::Storage("network timeout".into())) }
        })
        .await;

    // max_retries retries after the first attempt.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_matches!(
        result,
        RetryResult::Failure {
            kind: ErrorKind::Transient,
            attempts: 4,
            sent_to_dead_letter: true,
            ..
        }
    );
    assert_eq!(store.dead_letter_count(), 1);
    let entry = store.dead_letters.lock().unwrap()[0].clone();
    assert_eq!(entry.entity_type, ENTITY_SOURCE_FILE);
    assert_eq!(entry.entity_id, file.id);
    assert_eq!(entry.total_retries, 3);
    assert_eq!(entry.error_type, ErrorKind::Transient.as_str());
    assert!(!entry.resolved);
}

#[tokio::test]
async fn permanent_error_fails_without_retry_or_dead_letter() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let exec = executor(&store, 3);
    let calls = AtomicUsize::new(0);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EtlError::Validation("schema violation on line 3".into())) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_matches!(
        result,
        RetryResult::Failure {
            kind: ErrorKind::Permanent,
            attempts: 1,
            sent_to_dead_letter: false,
            ..
        }
    );
    assert_eq!(store.dead_letter_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_errors_are_retried() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let exec = executor(&store, 1);
    let calls = AtomicUsize::new(0);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EtlError::Storage("429 too many requests".into())) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_matches!(
        result,
        RetryResult::Failure {
            kind: ErrorKind::RateLimited,
            sent_to_dead_letter: true,
            ..
        }
    );
}

// -- restart resume --

#[tokio::test(start_paused = true)]
async fn resumed_entity_burns_remaining_budget_only() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    // Two retries already persisted by a worker that died mid-backoff.
    store
        .set_retry_state(ENTITY_SOURCE_FILE, file.id, 2, None)
        .await
        .unwrap();
    let exec = executor(&store, 3);
    let calls = AtomicUsize::new(0);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EtlError::Storage("network timeout".into())) }
        })
        .await;

    // Attempts 3 and 4 only, not a fresh budget of 4.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_matches!(
        result,
        RetryResult::Failure {
            kind: ErrorKind::Transient,
            attempts: 4,
            sent_to_dead_letter: true,
            ..
        }
    );
    assert_eq!(store.dead_letter_count(), 1);
    assert_eq!(store.dead_letters.lock().unwrap()[0].total_retries, 3);
}

#[tokio::test]
async fn resumed_entity_resets_counter_on_success() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    store
        .set_retry_state(ENTITY_SOURCE_FILE, file.id, 2, None)
        .await
        .unwrap();
    let exec = executor(&store, 3);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || async {
            Ok::<_, EtlError>("ok")
        })
        .await;

    assert_matches!(result, RetryResult::Success { value: "ok", attempts: 3 });
    let stored = store.files.lock().unwrap().get(&file.id).unwrap().clone();
    assert_eq!(stored.retry_count, 0);
    assert!(stored.next_retry_at.is_none());
}

#[tokio::test]
async fn counter_at_budget_still_gets_one_final_attempt() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    // Counter already at max_retries + 1, e.g. after a config change
    // lowered the budget.
    store
        .set_retry_state(ENTITY_SOURCE_FILE, file.id, 4, None)
        .await
        .unwrap();
    let exec = executor(&store, 3);
    let calls = AtomicUsize::new(0);

    let result = exec
        .execute(entity(file.id), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EtlError::Storage("network timeout".into())) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_matches!(
        result,
        RetryResult::Failure {
            attempts: 4,
            sent_to_dead_letter: true,
            ..
        }
    );
}

// -- cancellation --

#[tokio::test(start_paused = true)]
async fn cancellation_stops_between_attempts() {
    let store = Arc::new(MemStore::new());
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let exec = executor(&store, 3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = exec
        .execute(entity(file.id), &cancel, || async {
            Err::<(), _>(EtlError::Storage("connection refused".into()))
        })
        .await;

    assert_matches!(result, RetryResult::Cancelled { attempts: 1 });
    assert_eq!(store.dead_letter_count(), 0);
}
