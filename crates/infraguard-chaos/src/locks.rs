//! Per-key mutual exclusion
//!
//! One async mutex per `(scenario, namespace)` key, created on first use
//! and dropped again once nobody holds or awaits it. Guards are held across
//! the orchestration call and the tracker update.
//! Multi-key acquisition always goes in key order so it cannot deadlock
//! against single-key holders or other multi-key callers.

use crate::types::IncidentKey;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Table = DashMap<IncidentKey, Arc<Mutex<()>>>;

/// Guard for one key; releasing it prunes the key's slot if it is idle
#[derive(Debug)]
pub struct KeyGuard {
    key: IncidentKey,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<Table>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table's own reference is the last one: no holder, no waiter
        self.table
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Lock table keyed by incident
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Arc<Table>,
}

impl KeyedLocks {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &IncidentKey) -> Arc<Mutex<()>> {
        // Clone out of the map so no shard lock is held while awaiting
        self.locks.entry(key.clone()).or_default().value().clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &IncidentKey) -> KeyGuard {
        let guard = self.slot(key).lock_owned().await;
        KeyGuard {
            key: key.clone(),
            guard: Some(guard),
            table: Arc::clone(&self.locks),
        }
    }

    /// Acquire every key within `wait`, in key order
    ///
    /// On expiry every guard taken so far is released and the number of
    /// keys still not acquired is returned as the error.
    pub async fn lock_all(
        &self,
        keys: impl IntoIterator<Item = IncidentKey>,
        wait: Duration,
    ) -> Result<Vec<KeyGuard>, usize> {
        let mut ordered: Vec<IncidentKey> = keys.into_iter().collect();
        ordered.sort();
        ordered.dedup();

        let total = ordered.len();
        let mut guards = Vec::with_capacity(total);
        let acquire = async {
            for key in &ordered {
                guards.push(self.lock(key).await);
            }
        };

        let acquired = tokio::time::timeout(wait, acquire).await.is_ok();
        if acquired {
            Ok(guards)
        } else {
            Err(total - guards.len())
        }
    }

    /// Number of keys currently held or awaited
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is held or awaited
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
