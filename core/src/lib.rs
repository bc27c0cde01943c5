//! eventgate core: attendee click accounting for a two-day virtual event.
//!
//! - [`write_through::WriteThrough`] records an attendee action locally, then
//!   merge-upserts it into the remote attendee store with linear backoff.
//! - [`monitor::ThresholdMonitor`] polls the store for today's click count and
//!   flips a one-way flag once capacity is reached.
//! - [`session::EventSession`] is the narrow interface a presentation shell
//!   drives: capture identity, join, show the overflow entry.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod action;
pub mod config;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod schedule;
pub mod session;
pub mod write_through;

pub use action::{AttendeeAction, ClientInfo};
pub use error::{EventGateError, Result};
pub use identity::{Identity, validate_email};
pub use monitor::{MonitorConfig, MonitorHandle, MonitorState, ThresholdMonitor};
pub use schedule::{Countdown, DayWindow, EventDay, EventSchedule, SessionTimes, day_window};
pub use session::{EventLinks, EventSession, JoinTicket, Persistence};
pub use write_through::{AttemptStatus, RetryPolicy, WriteOutcome, WriteReport, WriteThrough};

/// eventgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
