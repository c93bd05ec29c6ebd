//! Per-key mutual exclusion for download targets.
//!
//! [`KeyedLocks`] hands out one async mutex per key. Two workers holding the
//! same key never run concurrently; different keys never wait on each other.
//!
//! # Example
//!
//! ```
//! use export_files_core::download::KeyedLocks;
//!
//! # async fn example() {
//! let locks = KeyedLocks::new();
//! let answer = locks.with_lock("target", || async { 42 }).await;
//! assert_eq!(answer, 42);
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of per-key guards.
///
/// The map itself sits behind a short-lived `std::sync::Mutex` that is never
/// held across an await; each entry is an `Arc` to a `tokio::sync::Mutex`,
/// cloned out of the map before it is awaited. Entries live as long as the
/// table, which is bounded by the distinct targets of one run.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    ///
    /// The returned guard releases the key when dropped.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let guard = {
            let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(guards.entry(key.to_string()).or_default())
        };
        guard.lock_owned().await
    }

    /// Runs `operation` while holding the guard for `key`.
    ///
    /// The guard is released on every exit path, including an early return
    /// of an error from `operation` or the future being dropped.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        operation().await
    }

    /// Number of keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
