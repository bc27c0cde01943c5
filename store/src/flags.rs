//! Local durable flag store.
//!
//! A synchronous string key/value store that survives restarts on the same
//! machine. It caches identity and click facts; it is never the source of truth
//! while the remote store is reachable. Writes are last-write-wins per key.
//!
//! ## File Layout
//!
//! ```text
//! ~/.local/share/eventgate/flags.json   { "<key>": "<value>", ... }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::FlagStoreError;
use crate::record::ActionKind;

/// Namespaced keys written by eventgate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKey {
    IdentityEmail,
    IdentityName,
    ActionClicked(ActionKind),
    ActionClickTimestamp(ActionKind),
    /// Local main-stage click counter for an event day.
    ClickCount { day: u8 },
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagKey::IdentityEmail => f.write_str("identity-email"),
            FlagKey::IdentityName => f.write_str("identity-name"),
            FlagKey::ActionClicked(kind) => write!(f, "action-clicked:{}", kind.slug()),
            FlagKey::ActionClickTimestamp(kind) => {
                write!(f, "action-click-timestamp:{}", kind.slug())
            }
            FlagKey::ClickCount { day } => write!(f, "action-click-count:day{day}"),
        }
    }
}

/// Synchronous key/string store shared by every component in a process.
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, FlagStoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), FlagStoreError>;

    fn get_flag(&self, key: FlagKey) -> Result<Option<String>, FlagStoreError> {
        self.get(&key.to_string())
    }

    fn set_flag(&self, key: FlagKey, value: &str) -> Result<(), FlagStoreError> {
        self.set(&key.to_string(), value)
    }

    /// Read a counter; absent or unparsable values read as zero.
    fn read_count(&self, key: FlagKey) -> Result<u64, FlagStoreError> {
        Ok(self
            .get_flag(key)?
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0))
    }

    /// Add one to a counter and return the new value.
    fn increment(&self, key: FlagKey) -> Result<u64, FlagStoreError> {
        let next = self.read_count(key)?.saturating_add(1);
        self.set_flag(key, &next.to_string())?;
        Ok(next)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local flag store.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.entries).clone()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, FlagStoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FlagStoreError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flag store persisted as one JSON object.
///
/// The whole map is rewritten through a `.tmp` sibling and renamed into place
/// on every `set`, so a crash leaves either the old or the new file.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileFlagStore {
    /// Open the store at the XDG data directory (`~/.local/share/eventgate/flags.json`).
    pub fn open_default() -> Result<Self, FlagStoreError> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            FlagStoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine XDG_DATA_HOME",
            ))
        })?;
        Self::open(data_dir.join("eventgate").join("flags.json"))
    }

    /// Open (or create on first write) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FlagStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened flag store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), FlagStoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, FlagStoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FlagStoreError> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}
