//! Per-key distributed mutual exclusion.
//!
//! The lock serializes the read-decide-write-publish sequence of one channel
//! across all processes in the fleet. It is built on the store's atomic
//! [`set_nx`](crate::store::PresenceStore::set_nx) /
//! [`del_if_eq`](crate::store::PresenceStore::del_if_eq) primitives with a
//! random fencing token per acquisition, so a release can never delete a
//! lock that a later holder re-acquired.
//!
//! Validity is time-bounded: a holder that crashes without releasing stops
//! excluding others once its window lapses. The same bound reclaims the lock
//! if the critical section panics.

use crate::error::{LockError, PresenceError};
use crate::store::PresenceStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How long to sleep between contended acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// A handle for locking one key in the shared store.
pub struct DistributedLock {
    store: Arc<dyn PresenceStore>,
    key: String,
    validity: Duration,
    wait: Duration,
}

impl DistributedLock {
    /// Create a lock handle.
    ///
    /// `validity` bounds how long one acquisition may exclude others;
    /// `wait` bounds how long acquisition will block on a competing holder.
    pub fn new(
        store: Arc<dyn PresenceStore>,
        key: impl Into<String>,
        validity: Duration,
        wait: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            validity,
            wait,
        }
    }

    /// Run `f` while holding the lock.
    ///
    /// Acquisition polls until it wins or the bounded wait lapses
    /// ([`LockError::Timeout`]); a store failure during acquisition
    /// surfaces as [`LockError::Store`], distinct from failures inside
    /// `f`. The lock is released on every exit path of `f`, including
    /// errors; a failed release is logged and left to the validity bound.
    pub async fn with_lock<T, F, Fut>(&self, f: F) -> Result<T, PresenceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PresenceError>>,
    {
        let token = Uuid::new_v4().simple().to_string();
        let started = tokio::time::Instant::now();

        loop {
            if self
                .store
                .set_nx(&self.key, &token, self.validity)
                .await
                .map_err(LockError::Store)?
            {
                break;
            }
            if started.elapsed() >= self.wait {
                return Err(LockError::Timeout {
                    key: self.key.clone(),
                    waited_ms: started.elapsed().as_millis() as u64,
                }
                .into());
            }
            tracing::debug!(key = %self.key, "lock contended, retrying");
            tokio::time::sleep(RETRY_INTERVAL).await;
        }

        let result = f().await;

        if let Err(err) = self.store.del_if_eq(&self.key, &token).await {
            tracing::warn!(
                key = %self.key,
                error = %err,
                "failed to release lock; validity bound will reclaim it"
            );
        }

        result
    }
}
