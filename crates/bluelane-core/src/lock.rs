// ── Keyed mutex registry ──
//
// Serializes radio operations. One mutex per string key, created lazily on
// first use and never removed. Tokens release on drop, so every exit path
// of an operation (including `?` and panics) gives its locks back.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Serializes every radio operation in the process. The radio can only run
/// one GATT procedure at a time, so this is not per device.
pub const GLOBAL_LOCK: &str = "global";

/// Narrow exclusion between an in-flight connect and an explicit disconnect.
/// `connect` gives it back as soon as its command is dispatched so that a
/// queue-skipping disconnect can cancel the attempt.
pub const DISCONNECT_LOCK: &str = "disconnect";

/// Registry of independently acquirable async mutexes.
///
/// Waiters on the same key are served in FIFO order (`tokio::sync::Mutex`
/// is fair). Distinct keys never block each other.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free, then hold it until the token is released or dropped.
    pub async fn acquire(&self, key: &str) -> LockToken {
        let mutex = self.mutex_for(key);
        trace!(key, "waiting for lock");
        let guard = mutex.lock_owned().await;
        trace!(key, "lock acquired");
        LockToken {
            key: key.to_owned(),
            guard: Some(guard),
        }
    }

    /// Whether some token currently holds `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    // The map shard guard must not live across the `.await` in `acquire`.
    fn mutex_for(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key.to_owned()).or_default().value())
    }
}

/// Proof of holding one keyed lock.
///
/// Owned by the call frame that acquired it. `release` is idempotent and
/// `Drop` calls it, so a token can be released early and still be dropped
/// safely at the end of the scope.
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockToken {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    pub fn release(&mut self) {
        if self.guard.take().is_some() {
            trace!(key = %self.key, "lock released");
        }
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("key", &self.key)
            .field("held", &self.is_held())
            .finish()
    }
}
