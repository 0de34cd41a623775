//! Cluster-wide leases on top of the key-value store.
//!
//! A lease is a key written with set-if-absent and a TTL. The value is a
//! random token so that only the holder can renew or release it; a holder
//! that dies simply lets the lease expire.

use crate::kv::{KvError, KvStore, SetOptions};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Proof of holding a lease
///
/// Dropping the guard does not release the lease; call
/// [`ClusterLease::release`] or let the TTL run out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseGuard {
    key: String,
    token: String,
    acquired_at: DateTime<Utc>,
}

impl LeaseGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

/// Mutual exclusion across every instance sharing a [`KvStore`]
#[derive(Clone)]
pub struct ClusterLease {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ClusterLease {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lease; `None` when another holder has it
    pub async fn acquire(&self, key: &str) -> Result<Option<LeaseGuard>, KvError> {
        let token = Uuid::new_v4().to_string();

        let acquired = self
            .kv
            .set(
                key,
                Some(token.clone().into_bytes()),
                SetOptions::if_absent().expire_in(self.ttl),
            )
            .await?;

        if !acquired {
            debug!(key = %key, "Lease already held");
            return Ok(None);
        }

        Ok(Some(LeaseGuard {
            key: key.to_string(),
            token,
            acquired_at: Utc::now(),
        }))
    }

    /// Extend the lease by a full TTL; `false` when it was lost
    pub async fn renew(&self, guard: &LeaseGuard) -> Result<bool, KvError> {
        let renewed = self
            .kv
            .set(
                &guard.key,
                Some(guard.token.clone().into_bytes()),
                SetOptions::if_equals(guard.token.clone().into_bytes()).expire_in(self.ttl),
            )
            .await?;

        if !renewed {
            warn!(key = %guard.key, "Lease expired or taken over before renewal");
        }
        Ok(renewed)
    }

    /// Give the lease up; `false` when it had already expired or changed hands
    pub async fn release(&self, guard: LeaseGuard) -> Result<bool, KvError> {
        let released = self
            .kv
            .set(
                &guard.key,
                None,
                SetOptions::if_equals(guard.token.into_bytes()),
            )
            .await?;

        if !released {
            debug!(key = %guard.key, "Lease no longer held at release");
        }
        Ok(released)
    }

    /// Whether anyone currently holds the lease
    pub async fn is_held(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.kv.get(key).await?.is_some())
    }

    /// Renew the lease every half TTL until the returned handle is stopped
    ///
    /// The first failed or refused renewal marks the lease lost and ends the
    /// task; it is never re-acquired.
    pub fn keep_alive(&self, guard: &LeaseGuard) -> LeaseKeepAlive {
        let lost = Arc::new(AtomicBool::new(false));
        let period = (self.ttl / 2).max(Duration::from_millis(1));

        let lease = self.clone();
        let guard = guard.clone();
        let flag = lost.clone();
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticks.tick().await;
                match lease.renew(&guard).await {
                    Ok(true) => debug!(key = %guard.key, "Lease renewed"),
                    Ok(false) => break,
                    Err(e) => {
                        warn!(key = %guard.key, error = %e, "Lease renewal failed");
                        break;
                    }
                }
            }
            flag.store(true, Ordering::SeqCst);
        });

        LeaseKeepAlive { lost, task }
    }
}

/// Background renewal of one lease
///
/// Dropping the handle stops renewing.
#[derive(Debug)]
pub struct LeaseKeepAlive {
    lost: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LeaseKeepAlive {
    /// Whether a renewal failed, so the lease can no longer be trusted
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Stop renewing; the lease then lives out its current TTL
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for LeaseKeepAlive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
