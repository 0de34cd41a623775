//! # In-Memory Key-Value Store
//!
//! Thread-safe in-memory implementation of [`KvStore`] for testing and
//! development. Honours conditional writes and per-key expiry so that lease
//! and retry behaviour can be exercised without a host.
//!
//! Expired entries are dropped on every write, so a long-running process
//! holds only live keys plus whatever expired since the last write.

use crate::kv::{Expectation, KvError, KvStore, SetOptions};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Thread-safe in-memory key-value store
///
/// Clones share the same underlying map, which makes one instance usable as
/// the "cluster-wide" store for several simulated plugin instances.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
}

impl InMemoryKvStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with [`KvError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful writes (including deletes) since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable {
                message: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn evict_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
    }

    fn poisoned() -> KvError {
        KvError::OperationFailed {
            message: "in-memory store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.check_available()?;
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        let now = Instant::now();

        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Option<Vec<u8>>,
        options: SetOptions,
    ) -> Result<bool, KvError> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let now = Instant::now();
        Self::evict_expired(&mut entries, now);

        let current = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.as_slice());

        let expectation_met = match &options.expectation {
            Expectation::Any => true,
            Expectation::Absent => current.is_none(),
            Expectation::Equals(expected) => current == Some(expected.as_slice()),
        };

        if !expectation_met {
            return Ok(false);
        }

        match value {
            Some(value) => {
                let expires_at = options.expire_in.map(|ttl| now + ttl);
                entries.insert(key.to_string(), Entry { value, expires_at });
            }
            None => {
                entries.remove(key);
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        Self::evict_expired(&mut entries, Instant::now());
        if entries.remove(key).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        self.check_available()?;
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        let now = Instant::now();

        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "memory_kv_tests.rs"]
mod tests;
