use std::sync::Arc;
use std::time::Duration;

use eventgate_core::{
    AttendeeAction, EventDay, EventGateError, Identity, RetryPolicy, WriteOutcome, WriteThrough,
};
use eventgate_store::{
    ActionKind, FlagKey, FlagStore, MemoryAttendeeStore, MemoryFlagStore, StoreError, Value,
};
use pretty_assertions::assert_eq;

use super::support::{BrokenFlags, RecordingUpserts};

fn identity() -> Identity {
    Identity::from_email("a.b@x.com").unwrap()
}

fn capture() -> AttendeeAction {
    AttendeeAction::CaptureIdentity {
        email: "a.b@x.com".to_string(),
        name: Some("Ada".to_string()),
    }
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_the_last_allowed_attempt() {
    let store = Arc::new(MemoryAttendeeStore::new());
    store.fail_next_upserts(2);
    let writer = WriteThrough::new(store.clone(), Arc::new(MemoryFlagStore::new()));

    let report = writer.record_action(&identity(), &capture()).await.unwrap();

    assert_eq!(report.outcome, WriteOutcome::Persisted { attempts: 3 });
    assert_eq!(store.upsert_calls(), 3);
    assert!(store.get("a_b@x_com").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn exhaustion_is_reported_not_raised() {
    let store = Arc::new(MemoryAttendeeStore::new());
    store.fail_next_upserts(3);
    let writer = WriteThrough::new(store.clone(), Arc::new(MemoryFlagStore::new()));

    let report = writer.record_action(&identity(), &capture()).await.unwrap();

    match report.outcome {
        WriteOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("injected upsert failure"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(store.upsert_calls(), 3);
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn attempts_are_spaced_linearly() {
    let flags = Arc::new(MemoryFlagStore::new());
    let store = RecordingUpserts::failing(4, flags.clone());
    let writer = WriteThrough::new(store.clone(), flags).with_policy(RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1_000),
    });

    let started = tokio::time::Instant::now();
    let report = writer.record_action(&identity(), &capture()).await.unwrap();
    let finished = tokio::time::Instant::now();

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 4);
    for (k, pair) in attempts.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(1_000 * (k as u64 + 1)),
            "gap after attempt {} was {gap:?}",
            k + 1
        );
    }
    // 1s + 2s + 3s, and nothing after the final attempt.
    assert_eq!(finished - started, Duration::from_millis(6_000));
    assert_eq!(report.outcome.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn local_facts_land_before_the_first_remote_attempt() {
    let flags = Arc::new(MemoryFlagStore::new());
    let store = RecordingUpserts::failing(0, flags.clone());
    let writer = WriteThrough::new(store.clone(), flags.clone());

    writer.record_action(&identity(), &capture()).await.unwrap();

    assert_eq!(store.flag_views(), vec![2]);
    assert_eq!(
        flags.get_flag(FlagKey::IdentityEmail).unwrap().as_deref(),
        Some("a.b@x.com")
    );
}

#[tokio::test(start_paused = true)]
async fn local_failure_does_not_block_the_remote_write() {
    let store = Arc::new(MemoryAttendeeStore::new());
    let writer = WriteThrough::new(store.clone(), Arc::new(BrokenFlags));
    let click = AttendeeAction::join(
        ActionKind::MainStage,
        Some("a.b@x.com".to_string()),
        Some(EventDay::One),
    );

    let report = writer.record_action(&identity(), &click).await.unwrap();

    assert!(!report.local_recorded);
    assert_eq!(report.local_click_count, None);
    assert!(report.outcome.is_persisted());
}

#[tokio::test(start_paused = true)]
async fn rejected_request_is_a_contract_error() {
    let flags = Arc::new(MemoryFlagStore::new());
    let store = RecordingUpserts::failing_with(
        1,
        || StoreError::InvalidRequest("bad field path".to_string()),
        flags.clone(),
    );
    let writer = WriteThrough::new(store.clone(), flags);

    let err = writer
        .record_action(&identity(), &capture())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EventGateError::Store(StoreError::InvalidRequest(_))
    ));
    assert_eq!(store.attempts().len(), 1);
}

#[tokio::test]
async fn capturing_twice_keeps_one_record() {
    let store = Arc::new(MemoryAttendeeStore::new());
    let writer = WriteThrough::new(store.clone(), Arc::new(MemoryFlagStore::new()));

    writer.record_action(&identity(), &capture()).await.unwrap();
    writer.record_action(&identity(), &capture()).await.unwrap();

    assert_eq!(store.len().await, 1);
    let doc = store.get("a_b@x_com").await.unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("Ada")));
    assert!(matches!(doc.get("lastUpdated"), Some(Value::String(_))));
}
