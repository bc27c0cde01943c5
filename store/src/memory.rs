//! In-process attendee store.
//!
//! Same merge/count/list semantics as the hosted backend. Used for offline
//! runs and tests; failures can be injected to exercise retry paths.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::attendee::{AttendeeStore, StoredDocument};
use crate::error::{Result, StoreError};
use crate::query::CountQuery;
use crate::value::{Document, Fields, Value};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct MemoryAttendeeStore {
    docs: Mutex<BTreeMap<String, Document>>,
    clock: Clock,
    upsert_failures: AtomicUsize,
    count_failures: AtomicUsize,
    upsert_calls: AtomicUsize,
    count_calls: AtomicUsize,
}

impl MemoryAttendeeStore {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Use `clock` for resolving server timestamps.
    pub fn with_clock<C>(clock: C) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            clock: Box::new(clock),
            upsert_failures: AtomicUsize::new(0),
            count_failures: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` merge-upserts fail as unavailable.
    pub fn fail_next_upserts(&self, n: usize) {
        self.upsert_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` counts fail as unavailable.
    pub fn fail_next_counts(&self, n: usize) {
        self.count_failures.store(n, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<Document> {
        self.docs.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }
}

impl Default for MemoryAttendeeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_injected_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl AttendeeStore for MemoryAttendeeStore {
    async fn merge_upsert(&self, key: &str, fields: &Fields) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if key.is_empty() {
            return Err(StoreError::InvalidRequest(
                "document key must not be empty".to_string(),
            ));
        }
        if take_injected_failure(&self.upsert_failures) {
            return Err(StoreError::Unavailable("injected upsert failure".to_string()));
        }

        let now = (self.clock)();
        let mut docs = self.docs.lock().await;
        let doc = docs.entry(key.to_string()).or_default();
        for (field, value) in fields {
            let resolved = match value {
                Value::ServerTimestamp => Value::Timestamp(now),
                other => other.clone(),
            };
            doc.insert(field.clone(), resolved);
        }
        Ok(())
    }

    async fn count(&self, query: &CountQuery) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if take_injected_failure(&self.count_failures) {
            return Err(StoreError::Unavailable("injected count failure".to_string()));
        }

        let docs = self.docs.lock().await;
        Ok(docs.values().filter(|doc| query.matches(doc)).count() as u64)
    }

    async fn list_recent(&self, order_by: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        let docs = self.docs.lock().await;
        let mut ordered: Vec<(&String, &Document, &Value)> = docs
            .iter()
            .filter_map(|(key, doc)| doc.get(order_by).map(|v| (key, doc, v)))
            .collect();
        ordered.sort_by(|a, b| b.2.compare(a.2).unwrap_or(CmpOrdering::Equal));

        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|(key, doc, _)| StoredDocument {
                key: key.clone(),
                fields: doc.clone(),
            })
            .collect())
    }
}
