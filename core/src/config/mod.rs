//! Layered configuration for eventgate.
//!
//! 1. Defaults (from code)
//! 2. Config file (`eventgate.toml` or an explicit path)
//! 3. Environment variables (`EVENTGATE_*`, `__` between section and key)
//!
//! ```no_run
//! use eventgate_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::load_default()?;
//! let policy = config.retry.policy();
//! # Ok::<(), eventgate_core::config::ConfigError>(())
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{
    ConfigLoader, EventGateConfig, EventSettings, LocalSettings, MonitorSettings, RetrySettings,
    StoreBackend, StoreSettings,
};
