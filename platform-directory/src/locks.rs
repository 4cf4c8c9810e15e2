//! Exclusive locks over path prefixes.
//!
//! A structural change locks the path of the subtree it is about to rewrite.
//! Two keys conflict when one equals the other or is a prefix of it, so
//! changes on overlapping subtrees are serialized while changes in unrelated
//! parts of the forest proceed in parallel. Waiting is bounded: a caller that
//! cannot get its keys before the timeout gets
//! [`DirectoryError::ConcurrentModification`](crate::error::DirectoryError::ConcurrentModification)
//! and may retry.

use platform_org::PathKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::DirectoryResult;
use crate::retry::conflict;

/// Registry of held prefix locks.
#[derive(Debug, Default)]
pub struct PrefixLocks {
    held: Mutex<Vec<(u64, PathKey)>>,
    released: Notify,
    next_token: AtomicU64,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct PrefixGuard<'a> {
    locks: &'a PrefixLocks,
    token: u64,
    keys: Vec<PathKey>,
}

impl PrefixGuard<'_> {
    /// Keys held by this guard.
    pub fn keys(&self) -> &[PathKey] {
        &self.keys
    }
}

impl Drop for PrefixGuard<'_> {
    fn drop(&mut self) {
        let token = self.token;
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(holder, _)| *holder != token);
        self.locks.released.notify_waiters();
    }
}

fn overlaps(a: &PathKey, b: &PathKey) -> bool {
    a.covers(b) || b.covers(a)
}

impl PrefixLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all `keys` at once, waiting at most `timeout`.
    ///
    /// Keys are taken together or not at all, so two callers can never hold
    /// one key each while waiting on the other.
    pub async fn acquire(
        &self,
        keys: Vec<PathKey>,
        timeout: Duration,
    ) -> DirectoryResult<PrefixGuard<'_>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Registered before the check so a release in between is not lost.
            let released = self.released.notified();

            if let Some(token) = self.try_take(&keys) {
                return Ok(PrefixGuard {
                    locks: self,
                    token,
                    keys,
                });
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                let wanted: Vec<&str> = keys.iter().map(PathKey::as_str).collect();
                tracing::warn!(keys = ?wanted, timeout_ms = timeout.as_millis() as u64, "Prefix lock wait timed out");
                return Err(conflict(format!(
                    "subtree is locked by another change (waited {}ms)",
                    timeout.as_millis()
                )));
            }
        }
    }

    fn try_take(&self, keys: &[PathKey]) -> Option<u64> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let blocked = held
            .iter()
            .any(|(_, taken)| keys.iter().any(|key| overlaps(taken, key)));
        if blocked {
            return None;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        held.extend(keys.iter().cloned().map(|key| (token, key)));
        Some(token)
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
