use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use eventgate_core::{DayWindow, EventDay, MonitorConfig, MonitorState, ThresholdMonitor};
use eventgate_store::{FlagKey, FlagStore, MemoryFlagStore};
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use super::support::{ScriptedCounts, unavailable};

const POLL: Duration = Duration::from_secs(300);

fn window() -> DayWindow {
    DayWindow {
        start: Utc.with_ymd_and_hms(2025, 3, 7, 5, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2025, 3, 8, 5, 0, 0).unwrap(),
    }
}

fn monitor(store: Arc<ScriptedCounts>, flags: Arc<MemoryFlagStore>) -> ThresholdMonitor {
    ThresholdMonitor::new(store, flags).with_config(MonitorConfig {
        threshold: 5_000,
        poll_interval: POLL,
        ..MonitorConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn flips_once_at_threshold_and_stops_polling() {
    let store = ScriptedCounts::counts(&[0, 2_000, 4_999, 5_000, 6_000]);
    let handle = monitor(store.clone(), Arc::new(MemoryFlagStore::new()))
        .start(EventDay::One, window());

    sleep(POLL + Duration::from_secs(1)).await;
    assert_eq!(store.calls(), 2);
    assert_eq!(handle.state(), MonitorState::Polling);

    sleep(POLL).await;
    assert_eq!(store.calls(), 3);
    assert!(!handle.is_crossed());

    assert!(handle.wait_crossed().await);
    assert_eq!(store.calls(), 4);

    sleep(POLL * 10).await;
    assert_eq!(store.calls(), 4);
    assert_eq!(handle.state(), MonitorState::Crossed);
}

#[tokio::test(start_paused = true)]
async fn crossed_on_first_check_never_polls() {
    let store = ScriptedCounts::counts(&[5_000]);
    let handle = monitor(store.clone(), Arc::new(MemoryFlagStore::new()))
        .start(EventDay::Two, window());

    assert!(handle.wait_crossed().await);
    sleep(POLL * 3).await;

    assert_eq!(store.calls(), 1);
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_before_crossing_stops_polls() {
    let store = ScriptedCounts::counts(&[0]);
    let handle = monitor(store.clone(), Arc::new(MemoryFlagStore::new()))
        .start(EventDay::One, window());

    sleep(POLL + Duration::from_secs(1)).await;
    assert_eq!(store.calls(), 2);

    handle.cancel();
    sleep(POLL * 10).await;

    assert_eq!(store.calls(), 2);
    assert_eq!(handle.state(), MonitorState::Cancelled);
    handle.cancel();
    assert_eq!(handle.state(), MonitorState::Cancelled);
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_polls() {
    let store = ScriptedCounts::counts(&[0]);
    let handle = monitor(store.clone(), Arc::new(MemoryFlagStore::new()))
        .start(EventDay::One, window());
    let mut rx = handle.subscribe();

    sleep(Duration::from_secs(1)).await;
    drop(handle);
    sleep(POLL * 5).await;

    assert_eq!(store.calls(), 1);
    assert_eq!(*rx.borrow_and_update(), MonitorState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn failed_poll_counts_as_not_crossed() {
    let store = ScriptedCounts::new(vec![Ok(0), Err(unavailable()), Ok(5_000)]);
    let handle = monitor(store.clone(), Arc::new(MemoryFlagStore::new()))
        .start(EventDay::One, window());

    sleep(POLL + Duration::from_secs(1)).await;
    assert_eq!(handle.state(), MonitorState::Polling);

    assert!(handle.wait_crossed().await);
    assert_eq!(store.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn initial_failure_falls_back_to_local_counter() {
    let flags = Arc::new(MemoryFlagStore::new());
    flags
        .set_flag(FlagKey::ClickCount { day: 1 }, "5000")
        .unwrap();
    let store = ScriptedCounts::new(vec![Err(unavailable())]);
    let handle = monitor(store.clone(), flags).start(EventDay::One, window());

    assert!(handle.wait_crossed().await);
    sleep(POLL * 3).await;
    assert_eq!(store.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn low_local_fallback_keeps_polling() {
    let flags = Arc::new(MemoryFlagStore::new());
    flags
        .set_flag(FlagKey::ClickCount { day: 1 }, "12")
        .unwrap();
    let store = ScriptedCounts::new(vec![Err(unavailable()), Ok(5_001)]);
    let handle = monitor(store.clone(), flags).start(EventDay::One, window());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), MonitorState::Polling);

    assert!(handle.wait_crossed().await);
    assert_eq!(store.calls(), 2);
}
