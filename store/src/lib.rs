//! Attendee record storage for eventgate.
//!
//! Two tiers live here:
//!
//! - [`AttendeeStore`]: the remote document collection, one merged record per
//!   attendee identity. Backends: [`FirestoreStore`] (REST) and
//!   [`MemoryAttendeeStore`].
//! - [`FlagStore`]: the local durable key/value cache. Backends:
//!   [`FileFlagStore`] and [`MemoryFlagStore`].
//!
//! The remote tier is authoritative for "is this globally true"; the local tier
//! is authoritative for "did this client attempt it".

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod attendee;
pub mod error;
pub mod firestore;
pub mod flags;
mod memory;
pub mod query;
pub mod record;
pub mod value;

pub use attendee::{AttendeeStore, StoredDocument};
pub use error::{FlagStoreError, Result, StoreError};
pub use firestore::{FirestoreConfig, FirestoreStore};
pub use flags::{FileFlagStore, FlagKey, FlagStore, MemoryFlagStore};
pub use memory::MemoryAttendeeStore;
pub use query::{CountQuery, Filter, FilterOp};
pub use record::{ActionKind, AttendeeRecord};
pub use value::{Document, Fields, Value};

/// Collection holding one document per attendee identity.
pub const ATTENDEES_COLLECTION: &str = "attendees";
