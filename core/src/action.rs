//! Attendee actions and the fields each one writes.

use chrono::{DateTime, SecondsFormat, Utc};
use eventgate_store::record::fields;
use eventgate_store::{ActionKind, Fields, FlagKey, Value};

use crate::schedule::EventDay;

/// Bookkeeping attached to remote writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: String,
    pub referrer: Option<String>,
}

impl ClientInfo {
    /// Describe this process: `eventgate/<version> (<os>; <arch>)`.
    pub fn current() -> Self {
        Self {
            user_agent: format!(
                "eventgate/{} ({}; {})",
                crate::VERSION,
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            referrer: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::current()
    }
}

/// Something an attendee did that must be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendeeAction {
    /// Email (and optional name) entered at the gate.
    CaptureIdentity { email: String, name: Option<String> },
    /// Clicked a join button.
    Join {
        kind: ActionKind,
        email: Option<String>,
        day: Option<EventDay>,
    },
}

impl AttendeeAction {
    pub fn join(kind: ActionKind, email: Option<String>, day: Option<EventDay>) -> Self {
        AttendeeAction::Join { kind, email, day }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            AttendeeAction::CaptureIdentity { .. } => "identity",
            AttendeeAction::Join { kind, .. } => kind.slug(),
        }
    }

    /// Fields merged into the attendee record, minus `lastUpdated` which is
    /// stamped per attempt.
    pub fn remote_fields(&self, client: &ClientInfo) -> Fields {
        let mut out = Fields::new();
        let mut put = |field: &str, value: Value| {
            out.insert(field.to_string(), value);
        };

        match self {
            AttendeeAction::CaptureIdentity { email, name } => {
                put(fields::EMAIL, Value::from(email.as_str()));
                put(fields::NAME, Value::from(name.clone()));
                put(fields::TIMESTAMP, Value::ServerTimestamp);
                put(fields::USER_AGENT, Value::from(client.user_agent.as_str()));
                put(fields::REFERRER, Value::from(client.referrer.clone()));
            }
            AttendeeAction::Join { kind, email, day } => {
                if let Some(email) = email {
                    put(fields::EMAIL, Value::from(email.as_str()));
                }
                put(kind.clicked_field(), Value::Bool(true));
                put(kind.timestamp_field(), Value::ServerTimestamp);
                put(
                    fields::EVENT_DAY,
                    Value::from(day.map(|d| i64::from(d.number()))),
                );
                // The overflow write carries no client bookkeeping.
                if *kind == ActionKind::MainStage {
                    put(fields::USER_AGENT, Value::from(client.user_agent.as_str()));
                    put(fields::REFERRER, Value::from(client.referrer.clone()));
                }
            }
        }
        out
    }

    /// Local flag facts written before any remote attempt. The day counter is
    /// handled separately through [`AttendeeAction::counter_key`].
    pub fn local_facts(&self, now: DateTime<Utc>) -> Vec<(FlagKey, String)> {
        match self {
            AttendeeAction::CaptureIdentity { email, name } => {
                let mut facts = vec![(FlagKey::IdentityEmail, email.clone())];
                if let Some(name) = name {
                    facts.push((FlagKey::IdentityName, name.clone()));
                }
                facts
            }
            AttendeeAction::Join { kind, .. } => vec![
                (FlagKey::ActionClicked(*kind), "true".to_string()),
                (
                    FlagKey::ActionClickTimestamp(*kind),
                    now.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
            ],
        }
    }

    /// Local counter bumped by this action: main-stage clicks on an event day.
    pub fn counter_key(&self) -> Option<FlagKey> {
        match self {
            AttendeeAction::Join {
                kind: ActionKind::MainStage,
                day: Some(day),
                ..
            } => Some(FlagKey::ClickCount { day: day.number() }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn client() -> ClientInfo {
        ClientInfo {
            user_agent: "test-agent".to_string(),
            referrer: None,
        }
    }

    #[test]
    fn identity_capture_stores_null_name_and_server_time() {
        let action = AttendeeAction::CaptureIdentity {
            email: "A.B@x.com".to_string(),
            name: None,
        };
        let out = action.remote_fields(&client());

        assert_eq!(out.get("email"), Some(&Value::from("A.B@x.com")));
        assert_eq!(out.get("name"), Some(&Value::Null));
        assert_eq!(out.get("timestamp"), Some(&Value::ServerTimestamp));
        assert_eq!(out.get("referrer"), Some(&Value::Null));
        assert!(!out.contains_key("eventDay"));
        assert!(!out.contains_key("lastUpdated"));
    }

    #[test]
    fn main_stage_click_carries_day_and_bookkeeping() {
        let action = AttendeeAction::join(
            ActionKind::MainStage,
            Some("a@b.c".to_string()),
            Some(EventDay::One),
        );
        let out = action.remote_fields(&client());

        assert_eq!(out.get("buttonClicked"), Some(&Value::Bool(true)));
        assert_eq!(out.get("buttonClickTimestamp"), Some(&Value::ServerTimestamp));
        assert_eq!(out.get("eventDay"), Some(&Value::Integer(1)));
        assert_eq!(out.get("userAgent"), Some(&Value::from("test-agent")));
    }

    #[test]
    fn overflow_click_off_event_day_has_null_day_and_no_agent() {
        let action = AttendeeAction::join(ActionKind::Overflow, Some("a@b.c".to_string()), None);
        let out = action.remote_fields(&client());

        assert_eq!(out.get("overflowButtonClicked"), Some(&Value::Bool(true)));
        assert_eq!(out.get("eventDay"), Some(&Value::Null));
        assert!(!out.contains_key("userAgent"));
        assert!(!out.contains_key("buttonClicked"));
    }

    #[test]
    fn local_facts_use_namespaced_keys() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 14, 0, 0).unwrap();
        let action = AttendeeAction::join(ActionKind::MainStage, None, Some(EventDay::Two));

        let facts = action.local_facts(now);
        assert_eq!(
            facts,
            vec![
                (FlagKey::ActionClicked(ActionKind::MainStage), "true".to_string()),
                (
                    FlagKey::ActionClickTimestamp(ActionKind::MainStage),
                    "2025-03-07T14:00:00.000Z".to_string()
                ),
            ]
        );
        assert_eq!(action.counter_key(), Some(FlagKey::ClickCount { day: 2 }));
    }

    #[test]
    fn only_main_stage_on_a_day_has_a_counter() {
        assert_eq!(
            AttendeeAction::join(ActionKind::MainStage, None, None).counter_key(),
            None
        );
        assert_eq!(
            AttendeeAction::join(ActionKind::Overflow, None, Some(EventDay::One)).counter_key(),
            None
        );
    }

    #[test]
    fn identity_name_is_only_cached_when_given() {
        let now = Utc::now();
        let anonymous = AttendeeAction::CaptureIdentity {
            email: "a@b.c".to_string(),
            name: None,
        };
        assert_eq!(anonymous.local_facts(now).len(), 1);

        let named = AttendeeAction::CaptureIdentity {
            email: "a@b.c".to_string(),
            name: Some("Ada".to_string()),
        };
        assert_eq!(
            named.local_facts(now)[1],
            (FlagKey::IdentityName, "Ada".to_string())
        );
    }
}
