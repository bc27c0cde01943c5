//! Resilient write-through of attendee actions.
//!
//! Every action lands in the local flag store first, synchronously, then is
//! merge-upserted into the attendee store with linear backoff. Runtime store
//! failures are logged and absorbed; the caller always gets a [`WriteReport`]
//! back so the action that depends on the write (a redirect, usually) can
//! proceed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use eventgate_store::record::fields;
use eventgate_store::{AttendeeStore, FlagStore, Value};

use crate::action::{AttendeeAction, ClientInfo};
use crate::error::{EventGateError, Result};
use crate::identity::Identity;

/// Attempt budget and backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after failed attempt `k` is `k * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Wait between failed attempt `attempt` (1-indexed) and the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Result of the remote half of a write-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl WriteOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            WriteOutcome::Persisted { attempts } | WriteOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, WriteOutcome::Persisted { .. })
    }
}

/// Everything a caller learns from one `record_action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub outcome: WriteOutcome,
    /// False when the local flag store rejected the pre-write.
    pub local_recorded: bool,
    /// Local day counter after this action, for main-stage clicks on an event day.
    pub local_click_count: Option<u64>,
}

/// Progress of a write that is being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptStatus {
    /// Failed attempt number (1-indexed).
    pub attempt: u32,
    /// Wait before the next attempt; `None` after the final one.
    pub next_delay: Option<Duration>,
    pub reason: String,
}

/// Local-then-remote recorder shared by every action path.
#[derive(Clone)]
pub struct WriteThrough {
    store: Arc<dyn AttendeeStore>,
    flags: Arc<dyn FlagStore>,
    policy: RetryPolicy,
    client: ClientInfo,
}

impl WriteThrough {
    pub fn new(store: Arc<dyn AttendeeStore>, flags: Arc<dyn FlagStore>) -> Self {
        Self {
            store,
            flags,
            policy: RetryPolicy::default(),
            client: ClientInfo::current(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Write the action's local facts and bump its day counter.
    ///
    /// Returns whether every local write succeeded and the new counter value.
    pub fn record_local(&self, action: &AttendeeAction) -> (bool, Option<u64>) {
        let now = Utc::now();
        let mut recorded = true;

        for (key, value) in action.local_facts(now) {
            if let Err(err) = self.flags.set_flag(key, &value) {
                tracing::warn!(action = action.label(), %key, "local flag write failed: {err}");
                recorded = false;
            }
        }

        let count = action
            .counter_key()
            .and_then(|key| match self.flags.increment(key) {
                Ok(count) => Some(count),
                Err(err) => {
                    tracing::warn!(action = action.label(), %key, "local counter update failed: {err}");
                    recorded = false;
                    None
                }
            });

        (recorded, count)
    }

    /// Record `action` with the configured attempt budget.
    pub async fn record_action(
        &self,
        identity: &Identity,
        action: &AttendeeAction,
    ) -> Result<WriteReport> {
        self.record_action_with(identity, action, self.policy.max_attempts, |_| {})
            .await
    }

    /// Record `action` with up to `max_attempts` remote tries, reporting each
    /// failed attempt to `on_status`.
    ///
    /// Errors only on contract violations: a zero attempt budget, or a store
    /// that rejects the request as malformed.
    pub async fn record_action_with<F>(
        &self,
        identity: &Identity,
        action: &AttendeeAction,
        max_attempts: u32,
        on_status: F,
    ) -> Result<WriteReport>
    where
        F: FnMut(&AttemptStatus) + Send,
    {
        if max_attempts == 0 {
            return Err(EventGateError::InvalidAttempts);
        }

        let (local_recorded, local_click_count) = self.record_local(action);
        let outcome = self
            .persist(identity, action, max_attempts, on_status)
            .await?;
        Ok(WriteReport {
            outcome,
            local_recorded,
            local_click_count,
        })
    }

    /// Remote half of [`record_action_with`](Self::record_action_with), for
    /// callers that already wrote the local facts.
    pub async fn persist<F>(
        &self,
        identity: &Identity,
        action: &AttendeeAction,
        max_attempts: u32,
        mut on_status: F,
    ) -> Result<WriteOutcome>
    where
        F: FnMut(&AttemptStatus) + Send,
    {
        if max_attempts == 0 {
            return Err(EventGateError::InvalidAttempts);
        }

        let mut payload = action.remote_fields(&self.client);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            payload.insert(
                fields::LAST_UPDATED.to_string(),
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );

            match self.store.merge_upsert(identity.as_str(), &payload).await {
                Ok(()) => {
                    tracing::debug!(
                        identity = %identity,
                        action = action.label(),
                        attempt,
                        "attendee record saved"
                    );
                    return Ok(WriteOutcome::Persisted { attempts: attempt });
                }
                Err(err) if err.is_contract_violation() => {
                    tracing::error!(identity = %identity, action = action.label(), "store rejected write: {err}");
                    return Err(err.into());
                }
                Err(err) => {
                    let next_delay =
                        (attempt < max_attempts).then(|| self.policy.delay_after(attempt));
                    tracing::warn!(
                        identity = %identity,
                        action = action.label(),
                        "Attempt {attempt} failed: {err}"
                    );
                    last_error = err.to_string();
                    on_status(&AttemptStatus {
                        attempt,
                        next_delay,
                        reason: last_error.clone(),
                    });
                    if let Some(delay) = next_delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            identity = %identity,
            action = action.label(),
            attempts = max_attempts,
            "Failed to save attendee record after {max_attempts} attempts"
        );
        Ok(WriteOutcome::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
