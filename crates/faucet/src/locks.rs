//! Exclusive per-user locks serializing claim admission.

use dashmap::DashMap;
use drip_common::UserHandle;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<UserHandle, Arc<Mutex<()>>>;

/// Lock table keyed by identity handle. Claims for different users never
/// contend; claims for the same user run one at a time. Entries live only
/// while a task holds or waits on them.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Arc<LockTable>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's lock. Held until the guard drops.
    pub async fn acquire(&self, user: &UserHandle) -> UserLockGuard {
        let lock = self
            .locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        UserLockGuard {
            guard: Some(guard),
            user: user.clone(),
            locks: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on one user's lock.
pub struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user: UserHandle,
    locks: Arc<LockTable>,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table still references an idle lock; waiters hold a clone.
        self.locks
            .remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_waits() {
        let locks = Arc::new(UserLocks::new());
        let alice = UserHandle::from("alice");

        let guard = locks.acquire(&alice).await;
        let contender = {
            let locks = locks.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&alice).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_contend() {
        let locks = UserLocks::new();
        let _alice = locks.acquire(&UserHandle::from("alice")).await;
        let bob = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&UserHandle::from("bob")),
        )
        .await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_leave_no_entry() {
        let locks = UserLocks::new();
        let held = locks.acquire(&UserHandle::from("alice")).await;
        drop(locks.acquire(&UserHandle::from("bob")).await);

        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(UserLocks::new());
        let alice = UserHandle::from("alice");

        let held = locks.acquire(&alice).await;
        let waiter = {
            let locks = locks.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&alice).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(held);
        // The waiter acquired the same mutex, so the entry was still there
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }
}
