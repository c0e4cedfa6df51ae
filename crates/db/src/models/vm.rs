//! Virtual machine models and their child collections.

use serde::Serialize;
use sqlx::FromRow;
use virtsync_core::status::StatusId;
use virtsync_core::types::{DbId, Timestamp};

/// A virtual machine row, unique per (platform_id, uuid).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VirtualMachine {
    pub id: DbId,
    pub platform_id: DbId,
    pub host_id: Option<DbId>,
    pub uuid: String,
    pub instance_uuid: String,
    pub name: String,
    pub display_name: String,
    pub mo_ref: String,
    pub cluster_name: String,
    pub datacenter_name: String,
    pub resource_pool: String,
    pub folder: String,
    pub status_id: StatusId,
    pub power_state: String,
    pub connection_state: String,
    pub os_type: String,
    pub os_full_name: String,
    pub guest_id: String,
    pub guest_state: String,
    pub tools_status: String,
    pub tools_version: String,
    pub cpu_count: i32,
    pub cpu_cores_per_socket: i32,
    pub memory_mb: i64,
    pub hardware_version: String,
    pub ip_address: Option<String>,
    pub mac_address: String,
    pub hostname: String,
    pub disk_count: i32,
    pub total_disk_gb: i64,
    pub network_count: i32,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub has_snapshots: bool,
    pub snapshot_count: i32,
    pub is_template: bool,
    pub is_active: bool,
    pub boot_time: Option<Timestamp>,
    pub last_seen_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VmDisk {
    pub id: DbId,
    pub vm_id: DbId,
    pub device_key: i32,
    pub label: String,
    pub unit_number: Option<i32>,
    pub controller_key: Option<i32>,
    pub datastore_name: String,
    pub file_path: String,
    pub capacity_gb: i64,
    pub provisioning: String,
    pub disk_mode: String,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VmNetwork {
    pub id: DbId,
    pub vm_id: DbId,
    pub device_key: i32,
    pub label: String,
    pub network_name: String,
    pub adapter_type: String,
    pub mac_address: String,
    pub mac_type: String,
    pub connected: bool,
    pub start_connected: bool,
    pub updated_at: Timestamp,
}

/// A snapshot node. `parent_id` references another `vm_snapshots.id`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VmSnapshot {
    pub id: DbId,
    pub vm_id: DbId,
    pub snapshot_id: i64,
    pub parent_id: Option<DbId>,
    pub name: String,
    pub description: String,
    pub is_current: bool,
    pub is_quiesced: bool,
    pub power_state: String,
    pub snapshot_time: Option<Timestamp>,
    pub updated_at: Timestamp,
}
