//! Advisory lock seam: mutual exclusion per `(document_id, stage)`.

use crate::error::Result;
use async_trait::async_trait;

/// A per-(document, stage) mutual-exclusion primitive held during a stage
/// invocation. Implementations back this with whatever the deployment has
/// available (an embedded cache's lock table, a DB row lock, ...);
/// `krai-storage-cache` provides the `redb`-backed one.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Attempt to acquire the lock for `key`. Returns `true` on success.
    async fn try_acquire(&self, key: &str) -> Result<bool>;

    /// Release a previously-acquired lock. Always called from a `finally`-
    /// equivalent path on every exit from `safe_process`, whether or not
    /// acquisition succeeded.
    async fn release(&self, key: &str) -> Result<()>;
}

/// RAII guard that releases the lock on drop via a best-effort spawned
/// release, and exposes an explicit async `release` for the common path
/// where the caller wants to observe release errors.
pub struct LockGuard<'a> {
    key: String,
    lock: &'a dyn AdvisoryLock,
    released: bool,
}

impl<'a> LockGuard<'a> {
    #[must_use]
    pub fn new(key: String, lock: &'a dyn AdvisoryLock) -> Self {
        Self {
            key,
            lock,
            released: false,
        }
    }

    /// Release the lock, observing any error from the backend.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release(&self.key).await
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(key = %self.key, "advisory lock guard dropped without explicit release");
        }
    }
}
