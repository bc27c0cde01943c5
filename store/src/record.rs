//! Attendee record shape and field names.
//!
//! Field names are camelCase on the wire and are read by an external export
//! job, so they must not change.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::value::{Document, Value};

/// Wire names of every attendee field.
pub mod fields {
    pub const EMAIL: &str = "email";
    pub const NAME: &str = "name";
    pub const EVENT_DAY: &str = "eventDay";
    pub const BUTTON_CLICKED: &str = "buttonClicked";
    pub const BUTTON_CLICK_TIMESTAMP: &str = "buttonClickTimestamp";
    pub const OVERFLOW_BUTTON_CLICKED: &str = "overflowButtonClicked";
    pub const OVERFLOW_BUTTON_CLICK_TIMESTAMP: &str = "overflowButtonClickTimestamp";
    pub const TIMESTAMP: &str = "timestamp";
    pub const LAST_UPDATED: &str = "lastUpdated";
    pub const USER_AGENT: &str = "userAgent";
    pub const REFERRER: &str = "referrer";
}

/// The two "join" actions an attendee can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MainStage,
    Overflow,
}

impl ActionKind {
    /// Boolean field set once this action has been recorded.
    pub fn clicked_field(self) -> &'static str {
        match self {
            ActionKind::MainStage => fields::BUTTON_CLICKED,
            ActionKind::Overflow => fields::OVERFLOW_BUTTON_CLICKED,
        }
    }

    /// Server-assigned timestamp field for this action.
    pub fn timestamp_field(self) -> &'static str {
        match self {
            ActionKind::MainStage => fields::BUTTON_CLICK_TIMESTAMP,
            ActionKind::Overflow => fields::OVERFLOW_BUTTON_CLICK_TIMESTAMP,
        }
    }

    /// Short name used in local flag keys.
    pub fn slug(self) -> &'static str {
        match self {
            ActionKind::MainStage => "main-stage",
            ActionKind::Overflow => "overflow",
        }
    }
}

/// Typed view over a stored attendee document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRecord {
    pub identity: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub event_day: Option<i64>,
    pub button_clicked: bool,
    pub button_click_timestamp: Option<DateTime<Utc>>,
    pub overflow_button_clicked: bool,
    pub overflow_button_click_timestamp: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub last_updated: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl AttendeeRecord {
    /// Build the typed view. Missing or mistyped fields read as absent.
    pub fn from_document(identity: &str, doc: &Document) -> Self {
        let string = |field: &str| doc.get(field).and_then(|v| v.as_str().map(str::to_string));
        let flag = |field: &str| doc.get(field).and_then(Value::as_bool).unwrap_or(false);
        let instant = |field: &str| doc.get(field).and_then(Value::as_timestamp);

        Self {
            identity: identity.to_string(),
            email: string(fields::EMAIL),
            name: string(fields::NAME),
            event_day: doc.get(fields::EVENT_DAY).and_then(Value::as_i64),
            button_clicked: flag(fields::BUTTON_CLICKED),
            button_click_timestamp: instant(fields::BUTTON_CLICK_TIMESTAMP),
            overflow_button_clicked: flag(fields::OVERFLOW_BUTTON_CLICKED),
            overflow_button_click_timestamp: instant(fields::OVERFLOW_BUTTON_CLICK_TIMESTAMP),
            timestamp: instant(fields::TIMESTAMP),
            last_updated: string(fields::LAST_UPDATED),
            user_agent: string(fields::USER_AGENT),
            referrer: string(fields::REFERRER),
        }
    }
}
