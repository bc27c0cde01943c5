//! Store fakes shared by the suite.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use eventgate_store::{
    AttendeeStore, CountQuery, Fields, FlagStore, FlagStoreError, MemoryFlagStore, StoreError,
    StoredDocument,
};
use tokio::time::Instant;

/// Count results served in order; the last one repeats once the script runs out.
pub struct ScriptedCounts {
    script: Mutex<VecDeque<Result<u64, StoreError>>>,
    last: Mutex<u64>,
    calls: AtomicUsize,
}

impl ScriptedCounts {
    pub fn new(script: Vec<Result<u64, StoreError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn counts(counts: &[u64]) -> Arc<Self> {
        Self::new(counts.iter().copied().map(Ok).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn unavailable() -> StoreError {
    StoreError::Unavailable("scripted outage".to_string())
}

#[async_trait]
impl AttendeeStore for ScriptedCounts {
    async fn merge_upsert(&self, _key: &str, _fields: &Fields) -> eventgate_store::Result<()> {
        Ok(())
    }

    async fn count(&self, _query: &CountQuery) -> eventgate_store::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(count)) => {
                *self.last.lock().unwrap() = count;
                Ok(count)
            }
            Some(Err(err)) => Err(err),
            None => Ok(*self.last.lock().unwrap()),
        }
    }

    async fn list_recent(
        &self,
        _order_by: &str,
        _limit: usize,
    ) -> eventgate_store::Result<Vec<StoredDocument>> {
        Ok(Vec::new())
    }
}

/// Upsert fake that fails a fixed number of times and records when each
/// attempt happened and what the flag store held at that moment.
pub struct RecordingUpserts {
    failures: AtomicUsize,
    error: fn() -> StoreError,
    flags: Arc<MemoryFlagStore>,
    attempts: Mutex<Vec<Instant>>,
    flag_views: Mutex<Vec<usize>>,
}

impl RecordingUpserts {
    pub fn failing(n: usize, flags: Arc<MemoryFlagStore>) -> Arc<Self> {
        Self::failing_with(n, unavailable, flags)
    }

    pub fn failing_with(
        n: usize,
        error: fn() -> StoreError,
        flags: Arc<MemoryFlagStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(n),
            error,
            flags,
            attempts: Mutex::new(Vec::new()),
            flag_views: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    /// Number of local flags present at each attempt.
    pub fn flag_views(&self) -> Vec<usize> {
        self.flag_views.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttendeeStore for RecordingUpserts {
    async fn merge_upsert(&self, _key: &str, _fields: &Fields) -> eventgate_store::Result<()> {
        self.attempts.lock().unwrap().push(Instant::now());
        self.flag_views
            .lock()
            .unwrap()
            .push(self.flags.snapshot().len());
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err((self.error)());
        }
        Ok(())
    }

    async fn count(&self, _query: &CountQuery) -> eventgate_store::Result<u64> {
        Ok(0)
    }

    async fn list_recent(
        &self,
        _order_by: &str,
        _limit: usize,
    ) -> eventgate_store::Result<Vec<StoredDocument>> {
        Ok(Vec::new())
    }
}

/// Flag store whose disk is gone.
pub struct BrokenFlags;

impl FlagStore for BrokenFlags {
    fn get(&self, _key: &str) -> Result<Option<String>, FlagStoreError> {
        Err(FlagStoreError::Io(std::io::Error::other("disk gone")))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), FlagStoreError> {
        Err(FlagStoreError::Io(std::io::Error::other("disk gone")))
    }
}
