//! Firestore REST backend for the attendee collection.
//!
//! - merge-upsert: `documents:commit` with an update mask (only the given
//!   fields are touched) and `REQUEST_TIME` transforms for server timestamps
//! - count: `documents:runAggregationQuery` with a `count` aggregation
//! - listing: `documents:runQuery` ordered descending
//!
//! The web API key, when configured, travels as the `key` query parameter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::attendee::{AttendeeStore, StoredDocument};
use crate::error::{Result, StoreError};
use crate::query::{CountQuery, Filter, FilterOp};
use crate::value::{Document, Fields, Value};

/// Public Firestore REST endpoint.
const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Database id used when none is configured.
pub const DEFAULT_DATABASE: &str = "(default)";

/// Connection settings for [`FirestoreStore`].
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub collection: String,
    pub api_key: Option<String>,
    /// API root, e.g. `https://firestore.googleapis.com/v1`.
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            collection: crate::ATTENDEES_COLLECTION.to_string(),
            api_key: None,
            base_url: FIRESTORE_API_BASE.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Talk to a local emulator (`host:port`) over plain HTTP without a key.
    pub fn with_emulator(mut self, host: &str) -> Self {
        self.base_url = format!("http://{host}/v1");
        self.api_key = None;
        self
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{method}", self.base_url, self.documents_root())
    }

    fn document_name(&self, key: &str) -> String {
        format!("{}/{}/{key}", self.documents_root(), self.collection)
    }
}

/// Google error wrapper.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl GoogleError {
    fn has_reason(&self, reason: &str) -> bool {
        self.details
            .iter()
            .any(|detail| detail.reason.as_deref() == Some(reason))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationResponse {
    result: Option<AggregationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationResult {
    #[serde(default)]
    aggregate_fields: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, JsonValue>,
}

/// Firestore-backed [`AttendeeStore`].
pub struct FirestoreStore {
    client: reqwest::Client,
    config: FirestoreConfig,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Use a caller-built HTTP client (timeouts, proxies).
    pub fn with_client(client: reqwest::Client, config: FirestoreConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    async fn post(&self, method: &str, body: &JsonValue) -> Result<reqwest::Response> {
        let mut request = self.client.post(self.config.endpoint(method)).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(error_from_response(status.as_u16(), &text))
    }

    fn build_commit_body(&self, key: &str, fields: &Fields) -> Result<JsonValue> {
        if key.is_empty() || key.contains('/') {
            return Err(StoreError::InvalidRequest(format!(
                "invalid document key {key:?}"
            )));
        }

        let mut encoded = serde_json::Map::new();
        let mut mask = Vec::new();
        let mut transforms = Vec::new();
        for (field, value) in fields {
            match encode_value(value) {
                Some(json) => {
                    encoded.insert(field.clone(), json);
                    mask.push(JsonValue::from(field.as_str()));
                }
                None => transforms.push(json!({
                    "fieldPath": field,
                    "setToServerValue": "REQUEST_TIME",
                })),
            }
        }

        let mut write = json!({
            "update": {
                "name": self.config.document_name(key),
                "fields": encoded,
            },
            "updateMask": { "fieldPaths": mask },
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = JsonValue::Array(transforms);
        }

        Ok(json!({ "writes": [write] }))
    }

    fn build_structured_query(&self, filters: &[Filter]) -> Result<JsonValue> {
        let mut query = json!({
            "from": [{ "collectionId": self.config.collection }],
        });
        if !filters.is_empty() {
            let encoded = filters
                .iter()
                .map(encode_filter)
                .collect::<Result<Vec<_>>>()?;
            query["where"] = json!({
                "compositeFilter": { "op": "AND", "filters": encoded },
            });
        }
        Ok(query)
    }
}

#[async_trait]
impl AttendeeStore for FirestoreStore {
    async fn merge_upsert(&self, key: &str, fields: &Fields) -> Result<()> {
        let body = self.build_commit_body(key, fields)?;
        self.post("commit", &body).await?;
        tracing::debug!(key, fields = fields.len(), "firestore commit applied");
        Ok(())
    }

    async fn count(&self, query: &CountQuery) -> Result<u64> {
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": self.build_structured_query(&query.filters)?,
                "aggregations": [{ "alias": "count", "count": {} }],
            }
        });

        let response = self.post("runAggregationQuery", &body).await?;
        let results: Vec<AggregationResponse> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        results
            .into_iter()
            .filter_map(|r| r.result)
            .find_map(|r| r.aggregate_fields.get("count").and_then(decode_value))
            .and_then(|v| v.as_i64())
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| StoreError::Decode("aggregation response has no count".to_string()))
    }

    async fn list_recent(&self, order_by: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        let mut structured = self.build_structured_query(&[])?;
        structured["orderBy"] = json!([{
            "field": { "fieldPath": order_by },
            "direction": "DESCENDING",
        }]);
        structured["limit"] = JsonValue::from(limit);

        let response = self
            .post("runQuery", &json!({ "structuredQuery": structured }))
            .await?;
        let rows: Vec<RunQueryResponse> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(|raw| {
                let key = raw
                    .name
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let fields: Document = raw
                    .fields
                    .iter()
                    .filter_map(|(name, json)| decode_value(json).map(|v| (name.clone(), v)))
                    .collect();
                StoredDocument { key, fields }
            })
            .collect())
    }
}

/// Classify a non-2xx response. Requests the store refuses are never
/// contract violations; those are caught locally before anything is sent.
fn error_from_response(status: u16, body: &str) -> StoreError {
    let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) else {
        return error_from_status(status, body.to_string());
    };
    let error = parsed.error;
    let message = match &error.status {
        Some(code) => format!("{code}: {}", error.message),
        None => error.message.clone(),
    };

    if error.has_reason("API_KEY_INVALID") {
        return StoreError::PermissionDenied(message);
    }
    match error.status.as_deref() {
        Some("PERMISSION_DENIED" | "UNAUTHENTICATED") => StoreError::PermissionDenied(message),
        Some("FAILED_PRECONDITION" | "RESOURCE_EXHAUSTED" | "UNAVAILABLE") => {
            StoreError::Unavailable(message)
        }
        _ => error_from_status(status, message),
    }
}

fn error_from_status(status: u16, message: String) -> StoreError {
    match status {
        401 | 403 => StoreError::PermissionDenied(message),
        429 | 503 => StoreError::Unavailable(message),
        _ => StoreError::Api { status, message },
    }
}

/// Firestore wire encoding. `None` for the server timestamp sentinel, which is
/// sent as a field transform instead.
fn encode_value(value: &Value) -> Option<JsonValue> {
    let encoded = match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Integer(n) => json!({ "integerValue": n.to_string() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        Value::ServerTimestamp => return None,
    };
    Some(encoded)
}

/// Decode a Firestore value. Types eventgate never writes decode to `None`.
fn decode_value(raw: &JsonValue) -> Option<Value> {
    let obj = raw.as_object()?;
    if obj.contains_key("nullValue") {
        return Some(Value::Null);
    }
    if let Some(b) = obj.get("booleanValue").and_then(JsonValue::as_bool) {
        return Some(Value::Bool(b));
    }
    if let Some(n) = obj.get("integerValue") {
        // int64 travels as a decimal string; tolerate bare numbers too
        let parsed = match n {
            JsonValue::String(s) => s.parse::<i64>().ok(),
            other => other.as_i64(),
        };
        return parsed.map(Value::Integer);
    }
    if let Some(s) = obj.get("stringValue").and_then(JsonValue::as_str) {
        return Some(Value::String(s.to_string()));
    }
    if let Some(ts) = obj.get("timestampValue").and_then(JsonValue::as_str) {
        return DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)));
    }
    None
}

fn encode_filter(filter: &Filter) -> Result<JsonValue> {
    let value = encode_value(&filter.value).ok_or_else(|| {
        StoreError::InvalidRequest(format!(
            "filter on {} cannot compare against a server timestamp",
            filter.field
        ))
    })?;
    let op = match filter.op {
        FilterOp::Equal => "EQUAL",
        FilterOp::GreaterOrEqual => "GREATER_THAN_OR_EQUAL",
        FilterOp::LessThan => "LESS_THAN",
    };
    Ok(json!({
        "fieldFilter": {
            "field": { "fieldPath": filter.field },
            "op": op,
            "value": value,
        }
    }))
}
