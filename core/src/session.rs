//! The narrow interface a presentation shell drives.
//!
//! One [`EventSession`] per process. It owns the write-through, the event
//! calendar and at most one capacity monitor, which it tears down on
//! [`EventSession::shutdown`]. Dropping the session drops the monitor handle,
//! which cancels it as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeZone};
use eventgate_store::{ActionKind, AttendeeStore, FlagKey, FlagStore};
use tokio::sync::watch;

use crate::action::{AttendeeAction, ClientInfo};
use crate::config::EventGateConfig;
use crate::error::Result;
use crate::identity::{Identity, validate_email};
use crate::monitor::{MonitorConfig, MonitorHandle, MonitorState, ThresholdMonitor};
use crate::schedule::{EventDay, EventSchedule, day_window};
use crate::write_through::{AttemptStatus, RetryPolicy, WriteOutcome, WriteReport, WriteThrough};

const MEETING_URL: &str = "https://us02web.zoom.us/j/83407380871";

/// Redirect targets for the two join buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLinks {
    pub main_stage: String,
    pub overflow: String,
}

impl Default for EventLinks {
    fn default() -> Self {
        Self {
            main_stage: MEETING_URL.to_string(),
            overflow: MEETING_URL.to_string(),
        }
    }
}

impl EventLinks {
    pub fn url_for(&self, kind: ActionKind) -> &str {
        match kind {
            ActionKind::MainStage => &self.main_stage,
            ActionKind::Overflow => &self.overflow,
        }
    }
}

/// How far a join click got toward the attendee store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// No identity on record; only local flags were written.
    LocalOnly,
    Written(WriteOutcome),
    /// The store rejected the write as malformed.
    Failed(String),
}

/// What the shell needs to finish a join click. The URL is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTicket {
    pub kind: ActionKind,
    pub url: String,
    pub day: Option<EventDay>,
    pub persistence: Persistence,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct EventSession {
    writer: WriteThrough,
    flags: Arc<dyn FlagStore>,
    monitor: ThresholdMonitor,
    schedule: EventSchedule,
    links: EventLinks,
    active: Mutex<Option<MonitorHandle>>,
    local_overflow: AtomicBool,
}

impl EventSession {
    pub fn new(store: Arc<dyn AttendeeStore>, flags: Arc<dyn FlagStore>) -> Self {
        Self {
            writer: WriteThrough::new(Arc::clone(&store), Arc::clone(&flags)),
            monitor: ThresholdMonitor::new(store, Arc::clone(&flags)),
            flags,
            schedule: EventSchedule::default(),
            links: EventLinks::default(),
            active: Mutex::new(None),
            local_overflow: AtomicBool::new(false),
        }
    }

    /// Session wired from loaded configuration.
    pub fn from_config(
        config: &EventGateConfig,
        store: Arc<dyn AttendeeStore>,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        Self::new(store, flags)
            .with_retry_policy(config.retry.policy())
            .with_monitor_config(config.monitor.monitor_config())
            .with_schedule(config.event.schedule())
            .with_links(config.event.links())
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.writer = self.writer.with_policy(policy);
        self
    }

    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor = self.monitor.with_config(config);
        self
    }

    pub fn with_schedule(mut self, schedule: EventSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_links(mut self, links: EventLinks) -> Self {
        self.links = links;
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.writer = self.writer.with_client(client);
        self
    }

    pub fn schedule(&self) -> &EventSchedule {
        &self.schedule
    }

    pub fn links(&self) -> &EventLinks {
        &self.links
    }

    /// Email captured earlier on this machine, if any.
    pub fn stored_email(&self) -> Option<String> {
        match self.flags.get_flag(FlagKey::IdentityEmail) {
            Ok(email) => email.filter(|e| !e.is_empty()),
            Err(err) => {
                tracing::warn!("could not read stored identity: {err}");
                None
            }
        }
    }

    /// Validate and record the attendee's email at the gate.
    pub async fn capture_identity(&self, email: &str, name: Option<&str>) -> Result<WriteReport> {
        self.capture_identity_with(email, name, |_| {}).await
    }

    /// [`capture_identity`](Self::capture_identity), reporting each failed
    /// attempt so the shell can show a retry state.
    pub async fn capture_identity_with<F>(
        &self,
        email: &str,
        name: Option<&str>,
        on_status: F,
    ) -> Result<WriteReport>
    where
        F: FnMut(&AttemptStatus) + Send,
    {
        validate_email(email)?;
        let identity = Identity::from_email(email)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let action = AttendeeAction::CaptureIdentity {
            email: email.to_string(),
            name: name.map(str::to_string),
        };
        self.writer
            .record_action_with(&identity, &action, self.writer.policy().max_attempts, on_status)
            .await
    }

    /// Record a main-stage click. Marks the overflow visible once the local
    /// day counter reaches the threshold.
    pub async fn join_main_stage<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> JoinTicket {
        self.join_main_stage_with(now, |_| {}).await
    }

    /// [`join_main_stage`](Self::join_main_stage), reporting each failed
    /// attempt to `on_status`.
    pub async fn join_main_stage_with<Tz, F>(&self, now: &DateTime<Tz>, on_status: F) -> JoinTicket
    where
        Tz: TimeZone,
        F: FnMut(&AttemptStatus) + Send,
    {
        let day = self.schedule.day_at(now);
        let attempts = self.writer.policy().max_attempts;
        self.join(ActionKind::MainStage, day, attempts, on_status)
            .await
    }

    /// Record an overflow click. Single attempt, no retry.
    pub async fn join_overflow<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> JoinTicket {
        let day = self.schedule.day_at(now);
        self.join(ActionKind::Overflow, day, 1, |_| {}).await
    }

    async fn join<F>(
        &self,
        kind: ActionKind,
        day: Option<EventDay>,
        attempts: u32,
        on_status: F,
    ) -> JoinTicket
    where
        F: FnMut(&AttemptStatus) + Send,
    {
        let email = self.stored_email();
        let action = AttendeeAction::join(kind, email.clone(), day);
        let (_, count) = self.writer.record_local(&action);

        let persistence = match email.as_deref().map(Identity::from_email) {
            Some(Ok(identity)) => match self
                .writer
                .persist(&identity, &action, attempts, on_status)
                .await
            {
                Ok(outcome) => Persistence::Written(outcome),
                Err(err) => {
                    tracing::error!(action = kind.slug(), "join not persisted: {err}");
                    Persistence::Failed(err.to_string())
                }
            },
            _ => {
                tracing::info!(action = kind.slug(), "no identity on record, recorded locally");
                Persistence::LocalOnly
            }
        };

        if kind == ActionKind::MainStage
            && count.is_some_and(|c| c >= self.monitor.config().threshold)
        {
            self.local_overflow.store(true, Ordering::SeqCst);
        }

        JoinTicket {
            kind,
            url: self.links.url_for(kind).to_string(),
            day,
            persistence,
        }
    }

    /// Start the capacity monitor for today's event day. Replaces (and
    /// cancels) any monitor already running. `None` off event days.
    pub fn start_monitor<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<EventDay> {
        let day = self.schedule.day_at(now)?;

        let key = FlagKey::ClickCount { day: day.number() };
        if let Ok(local) = self.flags.read_count(key)
            && local >= self.monitor.config().threshold
        {
            self.local_overflow.store(true, Ordering::SeqCst);
        }

        let handle = self.monitor.start(day, day_window(now));
        if let Some(previous) = lock(&self.active).replace(handle) {
            previous.cancel();
        }
        Some(day)
    }

    pub fn monitor_state(&self) -> Option<MonitorState> {
        lock(&self.active).as_ref().map(MonitorHandle::state)
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<MonitorState>> {
        lock(&self.active).as_ref().map(MonitorHandle::subscribe)
    }

    /// Monitor crossed, or this client counted enough clicks locally.
    pub fn overflow_visible(&self) -> bool {
        self.local_overflow.load(Ordering::SeqCst)
            || lock(&self.active)
                .as_ref()
                .is_some_and(MonitorHandle::is_crossed)
    }

    /// Wait until the overflow becomes visible or the monitor stops.
    pub async fn wait_overflow(&self) -> bool {
        if self.overflow_visible() {
            return true;
        }
        let Some(mut rx) = self.subscribe() else {
            return false;
        };
        rx.wait_for(|s| *s != MonitorState::Polling)
            .await
            .map(|s| *s == MonitorState::Crossed)
            .unwrap_or(false)
    }

    /// Cancel the monitor, if any. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.active).take() {
            handle.cancel();
            tracing::debug!(day = %handle.day(), "capacity monitor stopped");
        }
    }
}
