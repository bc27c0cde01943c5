//! Error types for both store tiers.

use thiserror::Error;

/// Remote store result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures reported by an [`AttendeeStore`](crate::AttendeeStore).
///
/// Everything except [`StoreError::InvalidRequest`] describes a runtime
/// condition that a caller may retry or ride out, including requests the
/// remote store refuses (bad API key, missing index). `InvalidRequest` is
/// raised locally, before sending, for a request the store can never accept.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to decode store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// True when the error points at a bug in the caller rather than at the
    /// store's availability.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, StoreError::InvalidRequest(_))
    }
}

/// Failures from a [`FlagStore`](crate::FlagStore).
#[derive(Debug, Error)]
pub enum FlagStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
