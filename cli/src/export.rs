//! Contact export for the post-event mailing.

use chrono::{DateTime, SecondsFormat, Utc};
use eventgate_store::record::fields;
use eventgate_store::{AttendeeRecord, AttendeeStore, StoredDocument};
use serde::Serialize;

/// Default number of records exported.
pub const DEFAULT_EXPORT_LIMIT: usize = 100;

/// One mailing-list row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub email: Option<String>,
    pub name: Option<String>,
    pub joined_date: Option<String>,
    pub clicked_button: bool,
    pub button_click_time: Option<String>,
}

impl From<&StoredDocument> for Contact {
    fn from(doc: &StoredDocument) -> Self {
        let record = AttendeeRecord::from_document(&doc.key, &doc.fields);
        Self {
            email: record.email,
            name: record.name,
            joined_date: record.timestamp.map(iso),
            clicked_button: record.button_clicked,
            button_click_time: record.button_click_timestamp.map(iso),
        }
    }
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Most recently registered attendees, newest first.
pub async fn recent_contacts(
    store: &dyn AttendeeStore,
    limit: usize,
) -> eventgate_store::Result<Vec<Contact>> {
    let docs = store.list_recent(fields::TIMESTAMP, limit).await?;
    tracing::info!(count = docs.len(), "fetched attendee records");
    Ok(docs.iter().map(Contact::from).collect())
}
