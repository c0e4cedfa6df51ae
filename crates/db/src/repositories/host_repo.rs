//! Repository for the `hosts` table.

use sqlx::PgPool;
use virtsync_core::records::HostRecord;
use virtsync_core::types::DbId;

/// Provides query operations for hosts.
pub struct HostRepo;

impl HostRepo {
    /// Insert or refresh a host keyed by (platform_id, uuid), reactivating it.
    ///
    /// Returns the row id and whether the row was newly inserted.
    pub async fn upsert(
        pool: &PgPool,
        platform_id: DbId,
        rec: &HostRecord,
    ) -> Result<(DbId, bool), sqlx::Error> {
        sqlx::query_as::<_, (DbId, bool)>(
            "INSERT INTO hosts \
                 (platform_id, uuid, name, hostname, ip_address, mo_ref, \
                  cluster_name, datacenter_name, status_id, power_state, connection_state, \
                  vendor, model, esxi_version, esxi_build, cpu_model, \
                  cpu_cores, cpu_threads, cpu_sockets, cpu_frequency_mhz, memory_total_mb, \
                  vm_count, cpu_usage, memory_usage, in_maintenance) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                     $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25) \
             ON CONFLICT (platform_id, uuid) DO UPDATE SET \
                 name = EXCLUDED.name, hostname = EXCLUDED.hostname, \
                 ip_address = EXCLUDED.ip_address, mo_ref = EXCLUDED.mo_ref, \
                 cluster_name = EXCLUDED.cluster_name, \
                 datacenter_name = EXCLUDED.datacenter_name, \
                 status_id = EXCLUDED.status_id, power_state = EXCLUDED.power_state, \
                 connection_state = EXCLUDED.connection_state, \
                 vendor = EXCLUDED.vendor, model = EXCLUDED.model, \
                 esxi_version = EXCLUDED.esxi_version, esxi_build = EXCLUDED.esxi_build, \
                 cpu_model = EXCLUDED.cpu_model, cpu_cores = EXCLUDED.cpu_cores, \
                 cpu_threads = EXCLUDED.cpu_threads, cpu_sockets = EXCLUDED.cpu_sockets, \
                 cpu_frequency_mhz = EXCLUDED.cpu_frequency_mhz, \
                 memory_total_mb = EXCLUDED.memory_total_mb, \
                 vm_count = EXCLUDED.vm_count, cpu_usage = EXCLUDED.cpu_usage, \
                 memory_usage = EXCLUDED.memory_usage, \
                 in_maintenance = EXCLUDED.in_maintenance, \
                 is_active = TRUE, last_seen_at = NOW(), updated_at = NOW() \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(platform_id)
        .bind(&rec.uuid)
        .bind(&rec.name)
        .bind(&rec.hostname)
        .bind(&rec.ip_address)
        .bind(&rec.mo_ref)
        .bind(&rec.cluster_name)
        .bind(&rec.datacenter_name)
        .bind(rec.status.id())
        .bind(&rec.power_state)
        .bind(&rec.connection_state)
        .bind(&rec.vendor)
        .bind(&rec.model)
        .bind(&rec.esxi_version)
        .bind(&rec.esxi_build)
        .bind(&rec.cpu_model)
        .bind(rec.cpu_cores)
        .bind(rec.cpu_threads)
        .bind(rec.cpu_sockets)
        .bind(rec.cpu_frequency_mhz)
        .bind(rec.memory_total_mb)
        .bind(rec.vm_count)
        .bind(rec.cpu_usage)
        .bind(rec.memory_usage)
        .bind(rec.in_maintenance)
        .fetch_one(pool)
        .await
    }

    /// Deactivate every active host of the platform whose uuid is not in `seen`.
    pub async fn deactivate_except(
        pool: &PgPool,
        platform_id: DbId,
        seen: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE hosts SET is_active = FALSE, updated_at = NOW() \
             WHERE platform_id = $1 AND is_active AND NOT (uuid = ANY($2))",
        )
        .bind(platform_id)
        .bind(seen)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
