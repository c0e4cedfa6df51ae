//! Repository for the `host_metrics` and `vm_metrics` tables (append-only
//! time-series).

use sqlx::PgPool;
use virtsync_core::records::{HostMetricSample, VmMetricSample};
use virtsync_core::types::{DbId, Timestamp};

pub struct MetricsRepo;

impl MetricsRepo {
    /// Insert a host sample, resolving the host by (platform_id, uuid).
    ///
    /// Returns `false` if no such host exists.
    pub async fn insert_host_sample(
        pool: &PgPool,
        platform_id: DbId,
        sample: &HostMetricSample,
        collected_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO host_metrics \
                 (host_id, cpu_usage_percent, cpu_usage_mhz, memory_usage_percent, \
                  memory_used_mb, uptime_secs, collected_at) \
             SELECT h.id, $3, $4, $5, $6, $7, $8 FROM hosts h \
             WHERE h.platform_id = $1 AND h.uuid = $2",
        )
        .bind(platform_id)
        .bind(&sample.uuid)
        .bind(sample.cpu_usage_percent)
        .bind(sample.cpu_usage_mhz)
        .bind(sample.memory_usage_percent)
        .bind(sample.memory_used_mb)
        .bind(sample.uptime_secs)
        .bind(collected_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a VM sample, resolving the VM by (platform_id, uuid).
    pub async fn insert_vm_sample(
        pool: &PgPool,
        platform_id: DbId,
        sample: &VmMetricSample,
        collected_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO vm_metrics \
                 (vm_id, cpu_usage_percent, cpu_usage_mhz, memory_usage_percent, \
                  memory_used_mb, collected_at) \
             SELECT v.id, $3, $4, $5, $6, $7 FROM virtual_machines v \
             WHERE v.platform_id = $1 AND v.uuid = $2",
        )
        .bind(platform_id)
        .bind(&sample.uuid)
        .bind(sample.cpu_usage_percent)
        .bind(sample.cpu_usage_mhz)
        .bind(sample.memory_usage_percent)
        .bind(sample.memory_used_mb)
        .bind(collected_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete samples older than the cutoff from both tables.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let hosts = sqlx::query("DELETE FROM host_metrics WHERE collected_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        let vms = sqlx::query("DELETE FROM vm_metrics WHERE collected_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(hosts.rows_affected() + vms.rows_affected())
    }
}
