//! Capacity monitor for the main stage.
//!
//! Counts today's recorded clicks in the attendee store and flips a one-way
//! flag once the count reaches the threshold. The check runs immediately, then
//! every poll interval until the flag flips or the owner cancels.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use eventgate_async_utils::{OrCancelExt, RepeatingTask, TickFlow};
use eventgate_store::record::fields;
use eventgate_store::{ActionKind, AttendeeStore, CountQuery, Filter, FlagKey, FlagStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::schedule::{DayWindow, EventDay, day_window};

/// Main-stage capacity.
pub const DEFAULT_THRESHOLD: u64 = 5_000;

/// Five minutes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Lifecycle of one monitor. `Crossed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Polling,
    Crossed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub threshold: u64,
    pub poll_interval: Duration,
    /// Which click is counted.
    pub kind: ActionKind,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            kind: ActionKind::MainStage,
        }
    }
}

/// Clicks of `kind` recorded on `day` inside `window`.
pub fn threshold_query(kind: ActionKind, day: EventDay, window: &DayWindow) -> CountQuery {
    CountQuery::new()
        .filter(Filter::eq(kind.clicked_field(), true))
        .filter(Filter::gte(kind.timestamp_field(), window.start))
        .filter(Filter::lt(kind.timestamp_field(), window.end))
        .filter(Filter::eq(fields::EVENT_DAY, i64::from(day.number())))
}

/// Starts capacity monitors against a shared attendee store.
pub struct ThresholdMonitor {
    store: Arc<dyn AttendeeStore>,
    flags: Arc<dyn FlagStore>,
    config: MonitorConfig,
}

impl ThresholdMonitor {
    pub fn new(store: Arc<dyn AttendeeStore>, flags: Arc<dyn FlagStore>) -> Self {
        Self {
            store,
            flags,
            config: MonitorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start monitoring `day` over today's local window.
    pub fn start_today(&self, day: EventDay) -> MonitorHandle {
        self.start(day, day_window(&Local::now()))
    }

    /// Start monitoring `day` over `window`. Must be called inside a tokio
    /// runtime. The window is fixed for the life of the monitor.
    pub fn start(&self, day: EventDay, window: DayWindow) -> MonitorHandle {
        let config = self.config;
        let query = threshold_query(config.kind, day, &window);
        let (state_tx, _) = watch::channel(MonitorState::Polling);
        let state = Arc::new(state_tx);
        let token = CancellationToken::new();

        tracing::info!(
            %day,
            threshold = config.threshold,
            interval_secs = config.poll_interval.as_secs(),
            "starting capacity monitor"
        );

        let driver = tokio::spawn(drive(
            Arc::clone(&self.store),
            Arc::clone(&self.flags),
            config,
            day,
            query,
            Arc::clone(&state),
            token.clone(),
        ));

        MonitorHandle {
            day,
            state,
            token,
            driver: Some(driver),
        }
    }
}

async fn drive(
    store: Arc<dyn AttendeeStore>,
    flags: Arc<dyn FlagStore>,
    config: MonitorConfig,
    day: EventDay,
    query: CountQuery,
    state: Arc<watch::Sender<MonitorState>>,
    token: CancellationToken,
) {
    let initial = match store.count(&query).or_cancel(&token).await {
        Err(_) => return,
        Ok(Ok(count)) => count,
        Ok(Err(err)) => {
            let key = FlagKey::ClickCount { day: day.number() };
            let local = flags.read_count(key).unwrap_or_else(|flag_err| {
                tracing::warn!(%key, "local click counter unreadable: {flag_err}");
                0
            });
            tracing::warn!(%day, local, "initial capacity check failed, using local count: {err}");
            local
        }
    };

    if crossed(&state, initial, config.threshold) {
        token.cancel();
        return;
    }

    let tick_state = Arc::clone(&state);
    let task = RepeatingTask::spawn_with_token(token, config.poll_interval, move || {
        let store = Arc::clone(&store);
        let query = query.clone();
        let state = Arc::clone(&tick_state);
        async move {
            match store.count(&query).await {
                Ok(count) if crossed(&state, count, config.threshold) => TickFlow::Stop,
                Ok(count) => {
                    tracing::debug!(%day, count, "capacity poll");
                    TickFlow::Continue
                }
                Err(err) => {
                    tracing::warn!(%day, "capacity poll failed: {err}");
                    TickFlow::Continue
                }
            }
        }
    });
    task.join().await;
}

/// Flip `Polling -> Crossed` when `count` reaches `threshold`.
fn crossed(state: &watch::Sender<MonitorState>, count: u64, threshold: u64) -> bool {
    if count < threshold {
        return false;
    }
    let flipped = state.send_if_modified(|current| {
        if *current == MonitorState::Polling {
            *current = MonitorState::Crossed;
            true
        } else {
            false
        }
    });
    if flipped {
        tracing::info!(count, threshold, "main stage at capacity");
    }
    true
}

/// Owner's handle on a running monitor. Dropping it cancels the monitor.
pub struct MonitorHandle {
    day: EventDay,
    state: Arc<watch::Sender<MonitorState>>,
    token: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn day(&self) -> EventDay {
        self.day
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn is_crossed(&self) -> bool {
        self.state() == MonitorState::Crossed
    }

    /// Watch state changes from another task.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Wait until the monitor leaves `Polling`. Returns whether it crossed.
    pub async fn wait_crossed(&self) -> bool {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| *s != MonitorState::Polling).await {
            Ok(state) => *state == MonitorState::Crossed,
            Err(_) => self.is_crossed(),
        }
    }

    /// Stop polling. Idempotent; a crossed monitor stays crossed.
    pub fn cancel(&self) {
        self.state.send_if_modified(|current| {
            if *current == MonitorState::Polling {
                *current = MonitorState::Cancelled;
                true
            } else {
                false
            }
        });
        self.token.cancel();
    }

    /// Wait for the background job to exit without cancelling it.
    pub async fn join(mut self) {
        if let Some(driver) = self.driver.take()
            && let Err(err) = driver.await
        {
            tracing::warn!("capacity monitor ended abnormally: {err}");
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
