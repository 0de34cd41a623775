//! # Key-Value Persistence Contract
//!
//! The host supplies a key-value store with atomic set-if-matches semantics
//! and per-key expiry. Everything durable in this crate (the subscription
//! aggregate, delivery leases, done markers, username mappings) goes through
//! this interface.

use crate::RetryPolicy;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Options
// ============================================================================

/// Precondition for a conditional write
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Expectation {
    /// Unconditional write
    #[default]
    Any,
    /// Write only when the key does not exist (or has expired)
    Absent,
    /// Write only when the current value equals these bytes
    Equals(Vec<u8>),
}

/// Options for [`KvStore::set`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetOptions {
    pub expectation: Expectation,
    pub expire_in: Option<Duration>,
}

impl SetOptions {
    /// Unconditional write without expiry
    pub fn new() -> Self {
        Self::default()
    }

    /// Write only if the key is absent
    pub fn if_absent() -> Self {
        Self {
            expectation: Expectation::Absent,
            expire_in: None,
        }
    }

    /// Write only if the stored value equals `current`
    pub fn if_equals(current: Vec<u8>) -> Self {
        Self {
            expectation: Expectation::Equals(current),
            expire_in: None,
        }
    }

    /// Write only if the stored value matches `current` (absent when `None`)
    pub fn if_matches(current: Option<&[u8]>) -> Self {
        match current {
            Some(bytes) => Self::if_equals(bytes.to_vec()),
            None => Self::if_absent(),
        }
    }

    /// Expire the key after `ttl`
    pub fn expire_in(mut self, ttl: Duration) -> Self {
        self.expire_in = Some(ttl);
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from the key-value store
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    #[error("KV operation failed: {message}")]
    OperationFailed { message: String },

    #[error("KV store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Could not (de)serialize value for key '{key}': {message}")]
    Serialization { key: String, message: String },

    #[error("Conflicting concurrent writers on key '{key}' after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },
}

impl KvError {
    /// Check if the error may clear up on its own
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OperationFailed { .. } => true,
            Self::Unavailable { .. } => true,
            Self::Conflict { .. } => true,
            Self::Serialization { .. } => false,
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Interface to the host's durable key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value; `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Write (or delete, when `value` is `None`) subject to `options`
    ///
    /// Returns `Ok(false)` when the expectation in `options` was not met.
    async fn set(
        &self,
        key: &str,
        value: Option<Vec<u8>>,
        options: SetOptions,
    ) -> Result<bool, KvError>;

    /// Remove a key unconditionally; missing keys are not an error
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// List live keys starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

/// JSON and read-modify-write helpers available on every [`KvStore`]
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Read and decode a JSON value
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, KvError>
    where
        T: DeserializeOwned + Send;

    /// Encode and write a JSON value
    async fn set_json<T>(&self, key: &str, value: &T, options: SetOptions) -> Result<bool, KvError>
    where
        T: Serialize + Sync;

    /// Apply `update` to the current value and write the result atomically
    ///
    /// `update` receives the raw current value and returns the bytes to store,
    /// or `None` when there is nothing to write. On a conflicting concurrent
    /// write the value is re-read and `update` runs again, up to
    /// `policy.max_attempts` times.
    async fn set_atomic_with_retries<F>(
        &self,
        key: &str,
        policy: &RetryPolicy,
        update: F,
    ) -> Result<(), KvError>
    where
        F: FnMut(Option<&[u8]>) -> Result<Option<Vec<u8>>, KvError> + Send;
}

#[async_trait]
impl<S: KvStore + ?Sized> KvStoreExt for S {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, KvError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => {
                let value =
                    serde_json::from_slice(&bytes).map_err(|e| KvError::Serialization {
                        key: key.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, options: SetOptions) -> Result<bool, KvError>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set(key, Some(bytes), options).await
    }

    async fn set_atomic_with_retries<F>(
        &self,
        key: &str,
        policy: &RetryPolicy,
        mut update: F,
    ) -> Result<(), KvError>
    where
        F: FnMut(Option<&[u8]>) -> Result<Option<Vec<u8>>, KvError> + Send,
    {
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let current = self.get(key).await?;
            let next = match update(current.as_deref())? {
                Some(next) => next,
                None => return Ok(()),
            };

            if self
                .set(key, Some(next), SetOptions::if_matches(current.as_deref()))
                .await?
            {
                return Ok(());
            }

            debug!(key = %key, attempt, "Atomic write lost race, retrying");
            let delay = policy.calculate_delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        warn!(key = %key, attempts, "Giving up atomic write after repeated conflicts");
        Err(KvError::Conflict {
            key: key.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
