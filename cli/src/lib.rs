//! `eventgate` command line shell.
//!
//! ## Commands
//!
//! - `eventgate identify <EMAIL> [--name <NAME>]`
//! - `eventgate join [--no-open]`
//! - `eventgate join-overflow [--no-open]`
//! - `eventgate monitor`
//! - `eventgate countdown`
//! - `eventgate export [--limit <N>]`

pub mod export;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use eventgate_core::config::{ConfigLoader, EventGateConfig, StoreBackend};
use eventgate_core::{
    AttemptStatus, EventDay, EventSchedule, EventSession, JoinTicket, Persistence, WriteOutcome,
    WriteReport,
};
use eventgate_store::{
    AttendeeStore, FileFlagStore, FirestoreStore, FlagStore, MemoryAttendeeStore,
};

use crate::export::{DEFAULT_EXPORT_LIMIT, recent_contacts};

/// Pause between recording a join and opening the meeting.
const REDIRECT_DELAY: Duration = Duration::from_millis(500);

/// Attendee gate for a two-day virtual event.
#[derive(Debug, Parser)]
#[command(name = "eventgate", version)]
pub struct Cli {
    /// Config file (defaults to ./eventgate.toml, then the user config dir).
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register the attendee's email.
    Identify(IdentifyArgs),
    /// Join the main stage.
    Join(JoinArgs),
    /// Join the overflow room.
    JoinOverflow(JoinArgs),
    /// Watch main stage capacity until it fills up.
    Monitor,
    /// Time left until the event starts.
    Countdown,
    /// Print recent registrations as JSON contacts.
    Export(ExportArgs),
}

#[derive(Debug, Parser)]
pub struct IdentifyArgs {
    /// Email address.
    pub email: String,

    /// Display name.
    #[arg(long = "name", short = 'n')]
    pub name: Option<String>,
}

#[derive(Debug, Parser)]
pub struct JoinArgs {
    /// Print the meeting URL instead of opening a browser.
    #[arg(long = "no-open")]
    pub no_open: bool,
}

#[derive(Debug, Parser)]
pub struct ExportArgs {
    /// Max records.
    #[arg(long = "limit", default_value_t = DEFAULT_EXPORT_LIMIT)]
    pub limit: usize,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Command::Countdown => {
            for line in countdown_lines(config.event.schedule(), Utc::now(), &Local) {
                println!("{line}");
            }
        }
        Command::Identify(args) => {
            let session = open_session(&config)?;
            let report = session
                .capture_identity_with(&args.email, args.name.as_deref(), print_retry)
                .await?;
            println!("{}", describe_report(&args.email, &report));
        }
        Command::Join(args) => {
            let session = open_session(&config)?;
            let ticket = session
                .join_main_stage_with(&Local::now(), print_retry)
                .await;
            redirect(&ticket, args.no_open).await;
        }
        Command::JoinOverflow(args) => {
            let session = open_session(&config)?;
            let ticket = session.join_overflow(&Local::now()).await;
            redirect(&ticket, args.no_open).await;
        }
        Command::Monitor => monitor(&open_session(&config)?).await?,
        Command::Export(args) => {
            let store = open_store(&config)?;
            let contacts = recent_contacts(store.as_ref(), args.limit)
                .await
                .context("listing attendee records")?;
            println!("{}", serde_json::to_string_pretty(&contacts)?);
        }
    }
    Ok(())
}

fn open_session(config: &EventGateConfig) -> anyhow::Result<EventSession> {
    let store = open_store(config)?;
    let flags = open_flags(config)?;
    Ok(EventSession::from_config(config, store, flags))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EventGateConfig> {
    let config = match path {
        Some(path) => ConfigLoader::new().with_file(path).load()?,
        None => ConfigLoader::load_default()?,
    };
    config.validate()?;
    Ok(config)
}

fn open_store(config: &EventGateConfig) -> anyhow::Result<Arc<dyn AttendeeStore>> {
    Ok(match config.store.backend {
        StoreBackend::Firestore => Arc::new(FirestoreStore::new(config.store.firestore()?)),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory attendee store; nothing is shared");
            Arc::new(MemoryAttendeeStore::new())
        }
    })
}

fn open_flags(config: &EventGateConfig) -> anyhow::Result<Arc<dyn FlagStore>> {
    let flags = match &config.local.flags_path {
        Some(path) => FileFlagStore::open(path),
        None => FileFlagStore::open_default(),
    }
    .context("opening local flag store")?;
    Ok(Arc::new(flags))
}

fn retry_notice(status: &AttemptStatus) -> Option<String> {
    status
        .next_delay
        .map(|_| format!("Retrying ({})...", status.attempt))
}

fn print_retry(status: &AttemptStatus) {
    if let Some(notice) = retry_notice(status) {
        println!("{notice}");
    }
}

fn describe_report(email: &str, report: &WriteReport) -> String {
    match &report.outcome {
        WriteOutcome::Persisted { .. } => format!("Registered {email}"),
        WriteOutcome::Exhausted {
            attempts,
            last_error,
        } => format!(
            "Registered {email} on this device only; saving failed after {attempts} attempts ({last_error})"
        ),
    }
}

async fn redirect(ticket: &JoinTicket, no_open: bool) {
    match &ticket.persistence {
        Persistence::Written(WriteOutcome::Exhausted { attempts, .. }) => {
            tracing::warn!(attempts, "join not saved remotely; continuing");
        }
        Persistence::LocalOnly => {
            tracing::info!("no registered email; run `eventgate identify` first to be counted");
        }
        Persistence::Failed(reason) => {
            tracing::warn!("join not saved: {reason}");
        }
        Persistence::Written(WriteOutcome::Persisted { .. }) => {}
    }

    println!("{}", ticket.url);
    if no_open {
        return;
    }
    tokio::time::sleep(REDIRECT_DELAY).await;
    if let Err(err) = webbrowser::open(&ticket.url) {
        tracing::warn!("could not open browser: {err}");
    }
}

async fn monitor(session: &EventSession) -> anyhow::Result<()> {
    let Some(day) = session.start_monitor(&Local::now()) else {
        println!("Not an event day; nothing to monitor");
        return Ok(());
    };
    println!("Watching main stage capacity for {day}");

    tokio::select! {
        crossed = session.wait_overflow() => {
            if crossed {
                println!("Main stage is full. Overflow room: {}", session.links().overflow);
            }
        }
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
        }
    }
    session.shutdown();
    Ok(())
}

/// Countdown line followed by both sessions in the viewer's zone.
fn countdown_lines<Tz>(schedule: EventSchedule, now: DateTime<Utc>, tz: &Tz) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut lines = vec![match schedule.countdown(now) {
        Some(left) => format!("Event starts in {left}"),
        None => "The event has started".to_string(),
    }];
    for day in [EventDay::One, EventDay::Two] {
        lines.push(format!(
            "Day {}: {}",
            day.number(),
            schedule.session(day).describe_in(tz)
        ));
    }
    lines
}
