//! Error types for eventgate operations

use eventgate_store::StoreError;
use thiserror::Error;

/// eventgate result type alias
pub type Result<T> = std::result::Result<T, EventGateError>;

/// Errors surfaced to callers.
///
/// Runtime store trouble (network, quota, permissions) never shows up here,
/// and neither do local flag failures: the write-through and the monitor
/// absorb both. What remains are input problems and contract violations.
/// Configuration problems stay in [`ConfigError`](crate::config::ConfigError).
#[derive(Debug, Error)]
pub enum EventGateError {
    #[error("{0}")]
    InvalidEmail(String),

    #[error("Identity must not be empty")]
    EmptyIdentity,

    #[error("Max attempts must be at least 1")]
    InvalidAttempts,

    #[error("Attendee store rejected the request: {0}")]
    Store(#[from] StoreError),
}
