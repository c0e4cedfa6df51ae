//! Repository for the `sync_locks` table: expiring keys.

use sqlx::PgPool;

pub struct SyncLockRepo;

impl SyncLockRepo {
    /// Set (or overwrite) a key to expire `ttl_secs` from the database's
    /// `NOW()`.
    pub async fn set(pool: &PgPool, key: &str, ttl_secs: f64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sync_locks (key, expires_at) \
             VALUES ($1, NOW() + make_interval(secs => $2)) \
             ON CONFLICT (key) DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(ttl_secs)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Seconds until a live key expires; `None` once it has.
    pub async fn remaining_secs(pool: &PgPool, key: &str) -> Result<Option<f64>, sqlx::Error> {
        sqlx::query_scalar::<_, f64>(
            "SELECT EXTRACT(EPOCH FROM expires_at - NOW())::float8 \
             FROM sync_locks WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sync_locks WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every key starting with `prefix`. Returns the number removed.
    pub async fn delete_prefix(pool: &PgPool, prefix: &str) -> Result<u64, sqlx::Error> {
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let result = sqlx::query("DELETE FROM sync_locks WHERE key LIKE $1 || '%'")
            .bind(escaped)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
