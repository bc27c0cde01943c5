use async_trait::async_trait;

use crate::error::Result;
use crate::query::CountQuery;
use crate::value::{Document, Fields};

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub fields: Document,
}

/// The remote attendee collection.
///
/// Implementations must apply [`merge_upsert`](AttendeeStore::merge_upsert)
/// with merge semantics: create the document when absent, otherwise overwrite
/// only the given fields. `Value::ServerTimestamp` fields are resolved by the
/// store's clock when the write lands.
#[async_trait]
pub trait AttendeeStore: Send + Sync {
    async fn merge_upsert(&self, key: &str, fields: &Fields) -> Result<()>;

    async fn count(&self, query: &CountQuery) -> Result<u64>;

    /// Newest-first listing by `order_by`. Documents lacking the field are
    /// skipped.
    async fn list_recent(&self, order_by: &str, limit: usize) -> Result<Vec<StoredDocument>>;
}
