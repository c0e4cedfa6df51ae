//! Per-platform rate limit on operator-triggered syncs.
//!
//! Advisory only: the check and the mark are separate operations, so two
//! concurrent triggers can both pass.

use std::sync::Arc;
use std::time::Duration;

use virtsync_core::types::DbId;
use virtsync_db::locks::LockStore;

const KEY_PREFIX: &str = "sync:platform:";

#[derive(Clone)]
pub struct ThrottleGuard {
    locks: Arc<dyn LockStore>,
    ttl: Duration,
}

impl ThrottleGuard {
    pub fn new(locks: Arc<dyn LockStore>, ttl: Duration) -> Self {
        Self { locks, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(platform_id: DbId) -> String {
        format!("{KEY_PREFIX}{platform_id}")
    }

    /// Whether a sync may start now. Fails open if the lock store errors.
    pub async fn is_allowed(&self, platform_id: DbId) -> bool {
        match self.locks.remaining(&Self::key(platform_id)).await {
            Ok(remaining) => remaining.is_none(),
            Err(e) => {
                tracing::warn!(platform_id, error = %e, "Throttle check failed, allowing sync");
                true
            }
        }
    }

    pub async fn mark_executed(&self, platform_id: DbId) {
        if let Err(e) = self
            .locks
            .set_with_expiry(&Self::key(platform_id), self.ttl)
            .await
        {
            tracing::warn!(platform_id, error = %e, "Failed to record sync throttle");
        }
    }

    pub async fn clear_limit(&self, platform_id: DbId) {
        if let Err(e) = self.locks.delete(&Self::key(platform_id)).await {
            tracing::warn!(platform_id, error = %e, "Failed to clear sync throttle");
        }
    }

    /// Seconds until the next sync is allowed, rounded up; 0 when allowed.
    pub async fn remaining_seconds(&self, platform_id: DbId) -> u64 {
        match self.locks.remaining(&Self::key(platform_id)).await {
            Ok(Some(left)) => left.as_millis().div_ceil(1000) as u64,
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(platform_id, error = %e, "Failed to read sync throttle");
                0
            }
        }
    }

    /// Lift the limit on every platform.
    pub async fn clear_all(&self) -> u64 {
        match self.locks.delete_prefix(KEY_PREFIX).await {
            Ok(count) => {
                tracing::info!(count, "Cleared all sync throttles");
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clear sync throttles");
                0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use virtsync_db::locks::MemoryLockStore;

    use super::*;

    fn guard() -> ThrottleGuard {
        ThrottleGuard::new(Arc::new(MemoryLockStore::new()), Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn mark_blocks_until_ttl_elapses() {
        let guard = guard();
        assert!(guard.is_allowed(7).await);

        guard.mark_executed(7).await;
        assert!(!guard.is_allowed(7).await);
        assert_eq!(guard.remaining_seconds(7).await, 300);

        tokio::time::advance(Duration::from_millis(120_500)).await;
        assert_eq!(guard.remaining_seconds(7).await, 180);

        tokio::time::advance(Duration::from_secs(180)).await;
        assert!(guard.is_allowed(7).await);
        assert_eq!(guard.remaining_seconds(7).await, 0);
    }

    #[tokio::test]
    async fn platforms_are_throttled_independently() {
        let guard = guard();
        guard.mark_executed(1).await;
        assert!(!guard.is_allowed(1).await);
        assert!(guard.is_allowed(2).await);
    }

    #[tokio::test]
    async fn clear_limit_and_clear_all() {
        let guard = guard();
        guard.mark_executed(1).await;
        guard.mark_executed(2).await;
        guard.mark_executed(3).await;

        guard.clear_limit(1).await;
        assert!(guard.is_allowed(1).await);

        assert_eq!(guard.clear_all().await, 2);
        assert!(guard.is_allowed(2).await);
        assert!(guard.is_allowed(3).await);
    }
}
