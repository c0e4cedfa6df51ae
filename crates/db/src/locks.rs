//! Shared expiring key-value store backing the sync throttle.
//!
//! Operations are individually atomic; callers get no multi-key
//! transactions. [`MemoryLockStore`] serves single-process deployments and
//! tests, [`PgLockStore`] shares keys across the API and worker processes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::StoreResult;
use crate::repositories::SyncLockRepo;

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key`, overwriting any previous value, to expire after `ttl`.
    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Time left before `key` expires; `None` if absent or expired.
    async fn remaining(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Delete every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local lock store. Uses `tokio::time::Instant` so tests can drive
/// expiry with a paused clock.
#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn remaining(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(expires) if *expires > now => Ok(Some(*expires - now)),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// Lock store over the `sync_locks` table. Expiry is both stamped and
/// evaluated by the database clock, so API and worker hosts with skewed
/// clocks agree on it.
#[derive(Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Longest expiry the interval arithmetic is asked to handle.
const MAX_TTL: Duration = Duration::from_secs(3650 * 24 * 3600);

#[async_trait]
impl LockStore for PgLockStore {
    async fn set_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let ttl_secs = ttl.min(MAX_TTL).as_secs_f64();
        SyncLockRepo::set(&self.pool, key, ttl_secs).await?;
        Ok(())
    }

    async fn remaining(&self, key: &str) -> StoreResult<Option<Duration>> {
        let secs = SyncLockRepo::remaining_secs(&self.pool, key).await?;
        Ok(secs.and_then(|s| Duration::try_from_secs_f64(s).ok()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        SyncLockRepo::delete(&self.pool, key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        Ok(SyncLockRepo::delete_prefix(&self.pool, prefix).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn keys_expire_after_ttl() {
        let store = MemoryLockStore::new();
        store
            .set_with_expiry("sync:platform:1", Duration::from_secs(300))
            .await
            .unwrap();

        let left = store.remaining("sync:platform:1").await.unwrap().unwrap();
        assert!(left <= Duration::from_secs(300) && left > Duration::from_secs(299));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(store.remaining("sync:platform:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() {
        let store = MemoryLockStore::new();
        for key in ["sync:platform:1", "sync:platform:2", "other:1"] {
            store
                .set_with_expiry(key, Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(store.delete_prefix("sync:platform:").await.unwrap(), 2);
        assert!(store.remaining("other:1").await.unwrap().is_some());
    }
}
