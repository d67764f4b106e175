use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::Collection;

type LockKey = (Collection, String);

/// Per-record async locks serializing writers of the same id.
///
/// Only covers writers inside this process. Two processes upserting the same
/// id can still both insert and leave two rows until the next upsert for that
/// id removes them.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `(collection, id)`
    #[inline]
    pub async fn lock(&self, collection: Collection, id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on can go
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            Arc::clone(
                locks
                    .entry((collection, id.to_string()))
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        mutex.lock_owned().await
    }

    /// Number of ids currently tracked
    #[inline]
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
