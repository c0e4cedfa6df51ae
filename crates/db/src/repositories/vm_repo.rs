//! Repository for `virtual_machines` and its child tables
//! (`vm_disks`, `vm_networks`, `vm_snapshots`).

use sqlx::PgPool;
use virtsync_core::records::{VmDiskRecord, VmNetworkRecord, VmRecord, VmSnapshotRecord};
use virtsync_core::types::DbId;

/// Provides query operations for virtual machines.
pub struct VmRepo;

impl VmRepo {
    // -- virtual_machines -----------------------------------------------------

    /// Insert or refresh a VM keyed by (platform_id, uuid). The host link is
    /// resolved by host name within the platform; no match leaves it NULL.
    pub async fn upsert(
        pool: &PgPool,
        platform_id: DbId,
        rec: &VmRecord,
    ) -> Result<(DbId, bool), sqlx::Error> {
        sqlx::query_as::<_, (DbId, bool)>(
            "INSERT INTO virtual_machines \
                 (platform_id, host_id, uuid, instance_uuid, name, display_name, mo_ref, \
                  cluster_name, datacenter_name, resource_pool, folder, status_id, \
                  power_state, connection_state, os_type, os_full_name, guest_id, \
                  guest_state, tools_status, tools_version, cpu_count, cpu_cores_per_socket, \
                  memory_mb, hardware_version, ip_address, mac_address, hostname, \
                  disk_count, total_disk_gb, network_count, cpu_usage_percent, \
                  memory_usage_percent, has_snapshots, snapshot_count, is_template, boot_time) \
             VALUES ($1, \
                     (SELECT id FROM hosts WHERE platform_id = $1 AND name = $2 \
                      ORDER BY is_active DESC, id LIMIT 1), \
                     $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                     $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, \
                     $31, $32, $33, $34, $35, $36) \
             ON CONFLICT (platform_id, uuid) DO UPDATE SET \
                 host_id = EXCLUDED.host_id, instance_uuid = EXCLUDED.instance_uuid, \
                 name = EXCLUDED.name, display_name = EXCLUDED.display_name, \
                 mo_ref = EXCLUDED.mo_ref, cluster_name = EXCLUDED.cluster_name, \
                 datacenter_name = EXCLUDED.datacenter_name, \
                 resource_pool = EXCLUDED.resource_pool, folder = EXCLUDED.folder, \
                 status_id = EXCLUDED.status_id, power_state = EXCLUDED.power_state, \
                 connection_state = EXCLUDED.connection_state, \
                 os_type = EXCLUDED.os_type, os_full_name = EXCLUDED.os_full_name, \
                 guest_id = EXCLUDED.guest_id, guest_state = EXCLUDED.guest_state, \
                 tools_status = EXCLUDED.tools_status, \
                 tools_version = EXCLUDED.tools_version, \
                 cpu_count = EXCLUDED.cpu_count, \
                 cpu_cores_per_socket = EXCLUDED.cpu_cores_per_socket, \
                 memory_mb = EXCLUDED.memory_mb, \
                 hardware_version = EXCLUDED.hardware_version, \
                 ip_address = EXCLUDED.ip_address, mac_address = EXCLUDED.mac_address, \
                 hostname = EXCLUDED.hostname, disk_count = EXCLUDED.disk_count, \
                 total_disk_gb = EXCLUDED.total_disk_gb, \
                 network_count = EXCLUDED.network_count, \
                 cpu_usage_percent = EXCLUDED.cpu_usage_percent, \
                 memory_usage_percent = EXCLUDED.memory_usage_percent, \
                 has_snapshots = EXCLUDED.has_snapshots, \
                 snapshot_count = EXCLUDED.snapshot_count, \
                 is_template = EXCLUDED.is_template, boot_time = EXCLUDED.boot_time, \
                 is_active = TRUE, last_seen_at = NOW(), updated_at = NOW() \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(platform_id)
        .bind(&rec.host_name)
        .bind(&rec.uuid)
        .bind(&rec.instance_uuid)
        .bind(&rec.name)
        .bind(&rec.display_name)
        .bind(&rec.mo_ref)
        .bind(&rec.cluster_name)
        .bind(&rec.datacenter_name)
        .bind(&rec.resource_pool)
        .bind(&rec.folder)
        .bind(rec.status.id())
        .bind(&rec.power_state)
        .bind(&rec.connection_state)
        .bind(rec.os_type.as_str())
        .bind(&rec.os_full_name)
        .bind(&rec.guest_id)
        .bind(&rec.guest_state)
        .bind(&rec.tools_status)
        .bind(&rec.tools_version)
        .bind(rec.cpu_count)
        .bind(rec.cpu_cores_per_socket)
        .bind(rec.memory_mb)
        .bind(&rec.hardware_version)
        .bind(&rec.ip_address)
        .bind(&rec.mac_address)
        .bind(&rec.hostname)
        .bind(rec.disk_count)
        .bind(rec.total_disk_gb)
        .bind(rec.network_count)
        .bind(rec.cpu_usage_percent)
        .bind(rec.memory_usage_percent)
        .bind(rec.has_snapshots)
        .bind(rec.snapshot_count)
        .bind(rec.is_template)
        .bind(rec.boot_time)
        .fetch_one(pool)
        .await
    }

    /// Deactivate every active non-template VM of the platform whose uuid is
    /// not in `seen`.
    pub async fn deactivate_except(
        pool: &PgPool,
        platform_id: DbId,
        seen: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE virtual_machines SET is_active = FALSE, updated_at = NOW() \
             WHERE platform_id = $1 AND is_active AND NOT is_template \
               AND NOT (uuid = ANY($2))",
        )
        .bind(platform_id)
        .bind(seen)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -- vm_disks -------------------------------------------------------------

    pub async fn upsert_disk(
        pool: &PgPool,
        vm_id: DbId,
        rec: &VmDiskRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO vm_disks \
                 (vm_id, device_key, label, unit_number, controller_key, datastore_name, \
                  file_path, capacity_gb, provisioning, disk_mode) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (vm_id, device_key) DO UPDATE SET \
                 label = EXCLUDED.label, unit_number = EXCLUDED.unit_number, \
                 controller_key = EXCLUDED.controller_key, \
                 datastore_name = EXCLUDED.datastore_name, \
                 file_path = EXCLUDED.file_path, capacity_gb = EXCLUDED.capacity_gb, \
                 provisioning = EXCLUDED.provisioning, disk_mode = EXCLUDED.disk_mode, \
                 updated_at = NOW()",
        )
        .bind(vm_id)
        .bind(rec.device_key)
        .bind(&rec.label)
        .bind(rec.unit_number)
        .bind(rec.controller_key)
        .bind(&rec.datastore_name)
        .bind(&rec.file_path)
        .bind(rec.capacity_gb)
        .bind(rec.provisioning.as_str())
        .bind(&rec.disk_mode)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete_disks_except(
        pool: &PgPool,
        vm_id: DbId,
        keys: &[i32],
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM vm_disks WHERE vm_id = $1 AND NOT (device_key = ANY($2))")
                .bind(vm_id)
                .bind(keys)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    // -- vm_networks ----------------------------------------------------------

    pub async fn upsert_network(
        pool: &PgPool,
        vm_id: DbId,
        rec: &VmNetworkRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO vm_networks \
                 (vm_id, device_key, label, network_name, adapter_type, mac_address, \
                  mac_type, connected, start_connected) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (vm_id, device_key) DO UPDATE SET \
                 label = EXCLUDED.label, network_name = EXCLUDED.network_name, \
                 adapter_type = EXCLUDED.adapter_type, \
                 mac_address = EXCLUDED.mac_address, mac_type = EXCLUDED.mac_type, \
                 connected = EXCLUDED.connected, \
                 start_connected = EXCLUDED.start_connected, updated_at = NOW()",
        )
        .bind(vm_id)
        .bind(rec.device_key)
        .bind(&rec.label)
        .bind(&rec.network_name)
        .bind(&rec.adapter_type)
        .bind(&rec.mac_address)
        .bind(&rec.mac_type)
        .bind(rec.connected)
        .bind(rec.start_connected)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete_networks_except(
        pool: &PgPool,
        vm_id: DbId,
        keys: &[i32],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM vm_networks WHERE vm_id = $1 AND NOT (device_key = ANY($2))",
        )
        .bind(vm_id)
        .bind(keys)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -- vm_snapshots ---------------------------------------------------------

    /// Upsert a snapshot node. Parent links are set separately by
    /// [`VmRepo::link_snapshot`] once every node of the tree exists.
    pub async fn upsert_snapshot(
        pool: &PgPool,
        vm_id: DbId,
        rec: &VmSnapshotRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO vm_snapshots \
                 (vm_id, snapshot_id, name, description, is_current, is_quiesced, \
                  power_state, snapshot_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (vm_id, snapshot_id) DO UPDATE SET \
                 name = EXCLUDED.name, description = EXCLUDED.description, \
                 is_current = EXCLUDED.is_current, is_quiesced = EXCLUDED.is_quiesced, \
                 power_state = EXCLUDED.power_state, \
                 snapshot_time = EXCLUDED.snapshot_time, updated_at = NOW()",
        )
        .bind(vm_id)
        .bind(rec.snapshot_id)
        .bind(&rec.name)
        .bind(&rec.description)
        .bind(rec.is_current)
        .bind(rec.is_quiesced)
        .bind(&rec.power_state)
        .bind(rec.snapshot_time)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete_snapshots_except(
        pool: &PgPool,
        vm_id: DbId,
        snapshot_ids: &[i64],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM vm_snapshots WHERE vm_id = $1 AND NOT (snapshot_id = ANY($2))",
        )
        .bind(vm_id)
        .bind(snapshot_ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Point a snapshot at its parent node; a `None` or unknown parent makes
    /// it a root.
    pub async fn link_snapshot(
        pool: &PgPool,
        vm_id: DbId,
        snapshot_id: i64,
        parent_snapshot_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE vm_snapshots SET parent_id = \
                 (SELECT p.id FROM vm_snapshots p WHERE p.vm_id = $1 AND p.snapshot_id = $3) \
             WHERE vm_id = $1 AND snapshot_id = $2",
        )
        .bind(vm_id)
        .bind(snapshot_id)
        .bind(parent_snapshot_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
