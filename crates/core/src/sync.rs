//! Keyed async locks — serialize operations that share a key.
//!
//! Gamification updates must serialize per user and document builds per
//! content hash. A global lock would couple unrelated users; this hands
//! out one async mutex per key instead. Lock entries are never evicted
//! while a guard is live; `compact` drops idle ones.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of independently lockable keys.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting behind any holder of the same
    /// key. Holders of other keys are unaffected.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Drop lock entries nobody is holding or waiting on.
    pub async fn compact(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of tracked keys (post-compaction this is the active set).
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("user-1").await;
                // Non-atomic read-modify-write; only safe if serialized.
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("user-a").await;
        // Would deadlock if keys shared a lock.
        let _b = locks.acquire("user-b").await;
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn compact_drops_idle_entries() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.acquire("user-1").await;
            locks.compact().await;
            assert_eq!(locks.len().await, 1);
        }
        locks.compact().await;
        assert!(locks.is_empty().await);
    }
}
