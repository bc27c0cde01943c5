use crate::config::error::{ConfigError, Result};
use crate::monitor::MonitorConfig;
use crate::schedule::{EventSchedule, SessionTimes};
use crate::session::EventLinks;
use crate::write_through::RetryPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use config::{Config, Environment, File};
use eventgate_store::{ATTENDEES_COLLECTION, ActionKind, FirestoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventGateConfig {
    /// Remote attendee store
    #[serde(default)]
    pub store: StoreSettings,

    /// Write-through retry budget
    #[serde(default)]
    pub retry: RetrySettings,

    /// Capacity monitor
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Event calendar and redirect targets
    #[serde(default)]
    pub event: EventSettings,

    /// Local flag store
    #[serde(default)]
    pub local: LocalSettings,
}

/// Which attendee store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Firestore,
    Memory,
}

/// Remote attendee store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Firestore project id (required for the firestore backend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Web API key sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// `host:port` of a local emulator; disables the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulator_host: Option<String>,
}

/// Retry configuration for attendee writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum write attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff step in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Capacity monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Event calendar and redirect targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_day_one")]
    pub day_one: NaiveDate,

    #[serde(default = "default_day_two")]
    pub day_two: NaiveDate,

    #[serde(default = "default_starts_at")]
    pub starts_at: DateTime<Utc>,

    /// Live session on day one, shown in the viewer's time zone
    #[serde(default = "default_day_one_session")]
    pub day_one_session: SessionTimes,

    #[serde(default = "default_day_two_session")]
    pub day_two_session: SessionTimes,

    #[serde(default = "default_meeting_url")]
    pub main_stage_url: String,

    #[serde(default = "default_meeting_url")]
    pub overflow_url: String,
}

/// Local flag store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Flag file; defaults to the user data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags_path: Option<PathBuf>,
}

// Default value functions
fn default_database() -> String {
    "(default)".to_string()
}
fn default_collection() -> String {
    ATTENDEES_COLLECTION.to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_threshold() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    300_000
}
fn default_day_one() -> NaiveDate {
    EventSchedule::default().day_one
}
fn default_day_two() -> NaiveDate {
    EventSchedule::default().day_two
}
fn default_starts_at() -> DateTime<Utc> {
    EventSchedule::default().starts_at
}
fn default_day_one_session() -> SessionTimes {
    EventSchedule::default().day_one_session
}
fn default_day_two_session() -> SessionTimes {
    EventSchedule::default().day_two_session
}
fn default_meeting_url() -> String {
    "https://us02web.zoom.us/j/83407380871".to_string()
}

// Default implementations
impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            project_id: None,
            api_key: None,
            database: default_database(),
            collection: default_collection(),
            emulator_host: None,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            day_one: default_day_one(),
            day_two: default_day_two(),
            starts_at: default_starts_at(),
            day_one_session: default_day_one_session(),
            day_two_session: default_day_two_session(),
            main_stage_url: default_meeting_url(),
            overflow_url: default_meeting_url(),
        }
    }
}

impl EventGateConfig {
    /// Reject values that would make the runtime misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.monitor.threshold == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.threshold must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.event.day_one == self.event.day_two {
            return Err(ConfigError::ValidationError(
                "event.day_one and event.day_two must differ".to_string(),
            ));
        }
        for (name, session) in [
            ("day_one_session", &self.event.day_one_session),
            ("day_two_session", &self.event.day_two_session),
        ] {
            if session.end <= session.start {
                return Err(ConfigError::ValidationError(format!(
                    "event.{name} must end after it starts"
                )));
            }
        }
        Ok(())
    }
}

impl StoreSettings {
    /// REST client settings for the firestore backend.
    pub fn firestore(&self) -> Result<FirestoreConfig> {
        let project_id = self
            .project_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("store.project_id".to_string()))?;

        let mut config = FirestoreConfig::new(project_id);
        config.database = self.database.clone();
        config.collection = self.collection.clone();
        if let Some(host) = &self.emulator_host {
            config = config.with_emulator(host);
        } else if let Some(key) = &self.api_key {
            config = config.with_api_key(key);
        }
        Ok(config)
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

impl MonitorSettings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            threshold: self.threshold,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            kind: ActionKind::MainStage,
        }
    }
}

impl EventSettings {
    pub fn schedule(&self) -> EventSchedule {
        EventSchedule {
            day_one: self.day_one,
            day_two: self.day_two,
            starts_at: self.starts_at,
            day_one_session: self.day_one_session,
            day_two_session: self.day_two_session,
        }
    }

    pub fn links(&self) -> EventLinks {
        EventLinks {
            main_stage: self.main_stage_url.clone(),
            overflow: self.overflow_url.clone(),
        }
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (EVENTGATE_ prefix)
    ///
    /// The result is not validated; call [`EventGateConfig::validate`].
    pub fn load(&self) -> Result<EventGateConfig> {
        let mut builder = Config::builder();

        // Layer 1: Defaults (serialize defaults to JSON and load as base)
        let defaults = EventGateConfig::default();
        let defaults_json = serde_json::to_string(&defaults)?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Layer 2: Config file (if provided)
        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // Layer 3: Environment variables, double underscore for nesting
        // Example: EVENTGATE_MONITOR__THRESHOLD=100
        // No setting is a list, so values are never split.
        builder = builder.add_source(
            Environment::with_prefix("EVENTGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: EventGateConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./eventgate.toml
    /// 2. XDG config: ~/.config/eventgate/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./eventgate.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("eventgate").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<EventGateConfig> {
        let loader = if let Some(config_path) = Self::find_config_file() {
            ConfigLoader::new().with_file(config_path)
        } else {
            ConfigLoader::new()
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
