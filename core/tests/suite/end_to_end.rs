use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use eventgate_core::monitor::threshold_query;
use eventgate_core::{
    EventDay, EventSession, MonitorConfig, MonitorState, Persistence, RetryPolicy, WriteOutcome,
    day_window,
};
use eventgate_store::{
    ActionKind, AttendeeStore, Fields, FirestoreConfig, FirestoreStore, FlagKey, FlagStore,
    MemoryAttendeeStore, MemoryFlagStore, StoreError, Value,
};
use pretty_assertions::assert_eq;

use super::support::RecordingUpserts;

fn eastern() -> FixedOffset {
    FixedOffset::west_opt(5 * 3_600).unwrap()
}

fn day_one_at(hour: u32) -> DateTime<FixedOffset> {
    eastern().with_ymd_and_hms(2025, 3, 7, hour, 0, 0).unwrap()
}

fn click_fields(day: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("buttonClicked".to_string(), Value::Bool(true));
    fields.insert("buttonClickTimestamp".to_string(), Value::ServerTimestamp);
    fields.insert("eventDay".to_string(), Value::Integer(day));
    fields
}

#[tokio::test]
async fn identity_then_click_merges_into_one_document() {
    let clock = day_one_at(13).with_timezone(&Utc);
    let store = Arc::new(MemoryAttendeeStore::with_clock(move || clock));
    let session = EventSession::new(store.clone(), Arc::new(MemoryFlagStore::new()));

    session.capture_identity("A.B@x.com", None).await.unwrap();
    let ticket = session.join_main_stage(&day_one_at(13)).await;

    assert_eq!(
        ticket.persistence,
        Persistence::Written(WriteOutcome::Persisted { attempts: 1 })
    );
    assert_eq!(ticket.day, Some(EventDay::One));
    assert_eq!(store.len().await, 1);

    let doc = store.get("A_B@x_com").await.unwrap();
    assert_eq!(doc.get("email"), Some(&Value::from("A.B@x.com")));
    assert_eq!(doc.get("name"), Some(&Value::Null));
    assert_eq!(doc.get("timestamp"), Some(&Value::Timestamp(clock)));
    assert_eq!(doc.get("buttonClicked"), Some(&Value::Bool(true)));
    assert_eq!(doc.get("buttonClickTimestamp"), Some(&Value::Timestamp(clock)));
    assert_eq!(doc.get("eventDay"), Some(&Value::Integer(1)));
}

#[tokio::test(start_paused = true)]
async fn five_thousandth_click_is_seen_on_the_next_poll() {
    let now = day_one_at(13);
    let clock = now.with_timezone(&Utc);
    let store = Arc::new(MemoryAttendeeStore::with_clock(move || clock));
    for n in 0..4_999 {
        store
            .merge_upsert(&format!("attendee{n}@x_com"), &click_fields(1))
            .await
            .unwrap();
    }

    let session = EventSession::new(store.clone(), Arc::new(MemoryFlagStore::new()))
        .with_monitor_config(MonitorConfig {
            threshold: 5_000,
            poll_interval: Duration::from_secs(300),
            kind: ActionKind::MainStage,
        });
    session.capture_identity("last@x.com", None).await.unwrap();

    assert_eq!(session.start_monitor(&now), Some(EventDay::One));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.count_calls(), 1);
    assert_eq!(session.monitor_state(), Some(MonitorState::Polling));

    session.join_main_stage(&now).await;
    assert!(session.wait_overflow().await);
    assert_eq!(store.count_calls(), 2);
    assert!(session.overflow_visible());
}

#[tokio::test]
async fn window_includes_midnight_and_excludes_the_instant_before() {
    let store = MemoryAttendeeStore::new();
    let midnight = eastern()
        .with_ymd_and_hms(2025, 3, 7, 0, 0, 0)
        .unwrap()
        .with_timezone(&Utc);

    for (key, at) in [
        ("before", midnight - TimeDelta::milliseconds(1)),
        ("at", midnight),
    ] {
        let mut fields = click_fields(1);
        fields.insert("buttonClickTimestamp".to_string(), Value::Timestamp(at));
        store.merge_upsert(key, &fields).await.unwrap();
    }

    let window = day_window(&day_one_at(9));
    let query = threshold_query(ActionKind::MainStage, EventDay::One, &window);

    assert_eq!(store.count(&query).await.unwrap(), 1);
}

#[tokio::test]
async fn other_days_do_not_count() {
    let clock = day_one_at(13).with_timezone(&Utc);
    let store = MemoryAttendeeStore::with_clock(move || clock);
    store.merge_upsert("one", &click_fields(1)).await.unwrap();
    store.merge_upsert("two", &click_fields(2)).await.unwrap();

    let window = day_window(&day_one_at(13));
    let query = threshold_query(ActionKind::MainStage, EventDay::One, &window);

    assert_eq!(store.count(&query).await.unwrap(), 1);
}

#[tokio::test]
async fn rejected_api_key_does_not_fail_identity_capture() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/v1/projects/demo/databases/(default)/documents:commit",
        ))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{ "reason": "API_KEY_INVALID" }]
            }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let store = FirestoreStore::new(
        FirestoreConfig::new("demo")
            .with_api_key("wrong")
            .with_base_url(format!("{}/v1", server.uri())),
    );
    let flags = Arc::new(MemoryFlagStore::new());
    let session = EventSession::new(Arc::new(store), flags.clone()).with_retry_policy(
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        },
    );

    let report = session.capture_identity("a@b.c", None).await.unwrap();

    assert!(matches!(
        report.outcome,
        WriteOutcome::Exhausted { attempts: 2, .. }
    ));
    assert_eq!(
        flags.get_flag(FlagKey::IdentityEmail).unwrap().as_deref(),
        Some("a@b.c")
    );
}

#[tokio::test]
async fn rejected_click_still_counts_toward_the_local_reveal() {
    let flags = Arc::new(MemoryFlagStore::new());
    flags.set_flag(FlagKey::IdentityEmail, "a@b.c").unwrap();
    flags.set_flag(FlagKey::ClickCount { day: 1 }, "2").unwrap();
    let store = RecordingUpserts::failing_with(
        1,
        || StoreError::InvalidRequest("bad field path".to_string()),
        flags.clone(),
    );
    let session = EventSession::new(store.clone(), flags.clone()).with_monitor_config(
        MonitorConfig {
            threshold: 3,
            ..MonitorConfig::default()
        },
    );

    let ticket = session.join_main_stage(&day_one_at(13)).await;

    assert!(matches!(ticket.persistence, Persistence::Failed(_)));
    assert_eq!(store.attempts().len(), 1);
    assert_eq!(flags.read_count(FlagKey::ClickCount { day: 1 }).unwrap(), 3);
    assert!(session.overflow_visible());
}
