//! Per-identifier async mutexes.
//!
//! Every lifecycle transition of one identifier (enqueue, bookkeeping after
//! an attempt, removal, recovery) runs under its lock, so the store and the
//! in-flight table never disagree about an identifier. Different
//! identifiers never contend. Idle entries are dropped with their last guard.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::TaskId;

#[derive(Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<TaskId, Arc<Mutex<()>>>,
}

pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    id: TaskId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the identifier's lock.
    ///
    /// Dropping the future while it waits still releases the entry: the
    /// empty `KeyGuard` outlives the pending acquire and cleans up after it.
    pub async fn lock(&self, id: &TaskId) -> KeyGuard<'_> {
        let mut key = KeyGuard {
            owner: self,
            id: id.clone(),
            guard: None,
        };
        let mutex = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        key.guard = Some(mutex.lock_owned().await);
        key
    }

    /// Identifiers with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still references the mutex: nobody waits.
        self.owner
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_identifier_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let id = TaskId::from("job-1");

        let first = locks.lock(&id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn distinct_identifiers_do_not_contend() {
        let locks = KeyedLocks::new();
        let a = locks.lock(&TaskId::from("a")).await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.lock(&TaskId::from("b"))).await;
        assert!(b.is_ok());
        drop(a);
    }

    #[tokio::test]
    async fn abandoned_waiter_releases_entry() {
        let locks = KeyedLocks::new();
        let id = TaskId::from("a");

        let holder = locks.lock(&id).await;
        let mut waiter = Box::pin(locks.lock(&id));
        assert!(
            tokio::time::timeout(Duration::from_millis(10), &mut waiter)
                .await
                .is_err()
        );

        // The waiter still references the mutex, so the holder keeps the entry.
        drop(holder);
        assert_eq!(locks.len(), 1);

        drop(waiter);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn idle_entries_are_released() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock(&TaskId::from("a")).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }
}
