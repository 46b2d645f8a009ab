//! Per-key transaction scope.
//!
//! At most one holder per key at a time; the guard releases the key on every
//! exit path, including early returns and panics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Keyed async locks.
#[derive(Clone, Default)]
pub struct TransactionScope {
    locks: Arc<Mutex<LockMap>>,
}

/// Exclusive hold on one key, released on drop.
pub struct TransactionGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl TransactionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and hold it.
    pub async fn transaction(&self, key: impl Into<String>) -> TransactionGuard {
        let key = key.into();
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        trace!(key = %key, "Transaction acquired");
        TransactionGuard {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Hold `key` only if nobody else does.
    pub fn try_transaction(&self, key: impl Into<String>) -> Option<TransactionGuard> {
        let key = key.into();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks.entry(key.clone()).or_default().clone();
        let guard = lock.try_lock_owned().ok()?;
        Some(TransactionGuard {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        })
    }

    /// Number of keys currently tracked.
    pub fn active_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl TransactionGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map still references the lock: nobody holds or waits for it.
        if let Some(lock) = locks.get(&self.key)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&self.key);
        }
        trace!(key = %self.key, "Transaction released");
    }
}
