//! Repository for the `datastores` and `datastore_hosts` tables.

use sqlx::PgPool;
use virtsync_core::records::DatastoreRecord;
use virtsync_core::types::DbId;

/// Provides query operations for datastores.
pub struct DatastoreRepo;

impl DatastoreRepo {
    /// Insert or refresh a datastore keyed by (platform_id, name).
    pub async fn upsert(
        pool: &PgPool,
        platform_id: DbId,
        rec: &DatastoreRecord,
    ) -> Result<(DbId, bool), sqlx::Error> {
        sqlx::query_as::<_, (DbId, bool)>(
            "INSERT INTO datastores \
                 (platform_id, name, mo_ref, url, datastore_type, access_mode, \
                  datacenter_name, capacity_gb, free_gb, uncommitted_gb, usage_percent, \
                  vm_count, nfs_server, nfs_path, is_accessible, is_maintenance, \
                  multiple_host_access) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             ON CONFLICT (platform_id, name) DO UPDATE SET \
                 mo_ref = EXCLUDED.mo_ref, url = EXCLUDED.url, \
                 datastore_type = EXCLUDED.datastore_type, \
                 access_mode = EXCLUDED.access_mode, \
                 datacenter_name = EXCLUDED.datacenter_name, \
                 capacity_gb = EXCLUDED.capacity_gb, free_gb = EXCLUDED.free_gb, \
                 uncommitted_gb = EXCLUDED.uncommitted_gb, \
                 usage_percent = EXCLUDED.usage_percent, vm_count = EXCLUDED.vm_count, \
                 nfs_server = EXCLUDED.nfs_server, nfs_path = EXCLUDED.nfs_path, \
                 is_accessible = EXCLUDED.is_accessible, \
                 is_maintenance = EXCLUDED.is_maintenance, \
                 multiple_host_access = EXCLUDED.multiple_host_access, \
                 is_active = TRUE, last_sync_at = NOW(), updated_at = NOW() \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(platform_id)
        .bind(&rec.name)
        .bind(&rec.mo_ref)
        .bind(&rec.url)
        .bind(rec.datastore_type.as_str())
        .bind(rec.access_mode.as_str())
        .bind(&rec.datacenter_name)
        .bind(rec.capacity_gb)
        .bind(rec.free_gb)
        .bind(rec.uncommitted_gb)
        .bind(rec.usage_percent)
        .bind(rec.vm_count)
        .bind(&rec.nfs_server)
        .bind(&rec.nfs_path)
        .bind(rec.is_accessible)
        .bind(rec.is_maintenance)
        .bind(rec.multiple_host_access)
        .fetch_one(pool)
        .await
    }

    pub async fn deactivate_except(
        pool: &PgPool,
        platform_id: DbId,
        seen: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE datastores SET is_active = FALSE, updated_at = NOW() \
             WHERE platform_id = $1 AND is_active AND NOT (name = ANY($2))",
        )
        .bind(platform_id)
        .bind(seen)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Replace the datastore's host associations in one transaction, so
    /// readers never observe a partially rebuilt set.
    pub async fn replace_hosts(
        pool: &PgPool,
        platform_id: DbId,
        datastore_id: DbId,
        host_names: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM datastore_hosts WHERE datastore_id = $1")
            .bind(datastore_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO datastore_hosts (datastore_id, host_id) \
             SELECT $1, h.id FROM hosts h \
             WHERE h.platform_id = $2 AND h.name = ANY($3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(datastore_id)
        .bind(platform_id)
        .bind(host_names)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
