use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per key (a sender, a target account). Entries are held weakly, so a key's lock
/// lives only as long as some request is holding or waiting for it.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Hash + Eq + Clone,
{
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    fn entry(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, lock| lock.strong_count() > 0);

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::KeyedLocks;

    #[tokio::test(start_paused = true)]
    async fn same_sender_should_be_serialized() {
        let locks = Arc::new(KeyedLocks::<String>::default());
        let first = locks.lock(&"alice".to_string()).await;

        let waiting = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _guard = locks.lock(&"alice".to_string()).await;
            }
        });

        assert!(timeout(Duration::from_secs(1), locks.lock(&"alice".to_string()))
            .await
            .is_err());
        assert!(!waiting.is_finished());

        drop(first);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn different_senders_should_not_block_each_other() {
        let locks = KeyedLocks::<String>::default();
        let _alice = locks.lock(&"alice".to_string()).await;

        assert!(timeout(Duration::from_secs(1), locks.lock(&"bob".to_string()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn released_locks_should_be_pruned() {
        let locks = KeyedLocks::<String>::default();
        drop(locks.lock(&"alice".to_string()).await);
        drop(locks.lock(&"bob".to_string()).await);

        let _carol = locks.lock(&"carol".to_string()).await;

        assert_eq!(locks.len(), 1);
    }
}
