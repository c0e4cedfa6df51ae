//! Canonical inventory records.
//!
//! Flat, validated structures produced by the normalizer and consumed by the
//! reconciler. Units are fixed: memory in MB, storage in GB, clock in MHz,
//! usage as a percentage in `[0, 100]`.

use serde::{Deserialize, Serialize};

use crate::status::{
    AccessMode, DatastoreType, DiskProvisioning, HostStatus, OsType, VmStatus,
};
use crate::types::Timestamp;

/// Platform-level facts gathered by the platform-info step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfoRecord {
    pub version: String,
    pub build: String,
    /// First datacenter reported, or empty.
    pub datacenter: String,
    pub total_hosts: i32,
    pub total_vms: i32,
    pub total_clusters: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub uuid: String,
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    pub mo_ref: String,
    pub cluster_name: String,
    pub datacenter_name: String,
    pub status: HostStatus,
    pub power_state: String,
    pub connection_state: String,
    pub vendor: String,
    pub model: String,
    pub esxi_version: String,
    pub esxi_build: String,
    pub cpu_model: String,
    pub cpu_cores: i32,
    pub cpu_threads: i32,
    pub cpu_sockets: i32,
    pub cpu_frequency_mhz: i32,
    pub memory_total_mb: i64,
    pub vm_count: i32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub in_maintenance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDiskRecord {
    pub device_key: i32,
    pub label: String,
    pub unit_number: Option<i32>,
    pub controller_key: Option<i32>,
    pub datastore_name: String,
    pub file_path: String,
    pub capacity_gb: i64,
    pub provisioning: DiskProvisioning,
    pub disk_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmNetworkRecord {
    pub device_key: i32,
    pub label: String,
    pub network_name: String,
    pub adapter_type: String,
    pub mac_address: String,
    pub mac_type: String,
    pub connected: bool,
    pub start_connected: bool,
}

/// A flattened snapshot node. `parent_snapshot_id` refers to another
/// record's `snapshot_id` and may point at a node that was not reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSnapshotRecord {
    pub snapshot_id: i64,
    pub parent_snapshot_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub is_current: bool,
    pub is_quiesced: bool,
    pub power_state: String,
    pub snapshot_time: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub uuid: String,
    pub instance_uuid: String,
    pub name: String,
    pub display_name: String,
    pub mo_ref: String,
    /// Name of the host the VM runs on; resolved to a host row on upsert.
    pub host_name: String,
    pub cluster_name: String,
    pub datacenter_name: String,
    pub resource_pool: String,
    pub folder: String,
    pub status: VmStatus,
    pub power_state: String,
    pub connection_state: String,
    pub os_type: OsType,
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
    pub boot_time: Option<Timestamp>,
    pub disks: Vec<VmDiskRecord>,
    pub networks: Vec<VmNetworkRecord>,
    pub snapshots: Vec<VmSnapshotRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreRecord {
    pub name: String,
    pub mo_ref: String,
    pub url: String,
    pub datastore_type: DatastoreType,
    pub access_mode: AccessMode,
    pub datacenter_name: String,
    pub capacity_gb: i64,
    pub free_gb: i64,
    pub uncommitted_gb: i64,
    pub usage_percent: f64,
    pub vm_count: i32,
    pub nfs_server: String,
    pub nfs_path: String,
    pub is_accessible: bool,
    pub is_maintenance: bool,
    pub multiple_host_access: bool,
    /// Names of hosts mounting the datastore; resolved to host rows on upsert.
    pub host_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub uuid: String,
    pub name: String,
    pub display_name: String,
    pub mo_ref: String,
    pub os_type: OsType,
    pub cpu_count: i32,
    pub memory_mb: i64,
    pub disk_gb: i64,
    pub category: String,
}

/// Point-in-time usage of a host, keyed by hardware UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetricSample {
    pub uuid: String,
    pub cpu_usage_percent: f64,
    pub cpu_usage_mhz: i64,
    pub memory_usage_percent: f64,
    pub memory_used_mb: i64,
    pub uptime_secs: i64,
}

/// Point-in-time usage of a VM, keyed by UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmMetricSample {
    pub uuid: String,
    pub cpu_usage_percent: f64,
    pub cpu_usage_mhz: i64,
    pub memory_usage_percent: f64,
    pub memory_used_mb: i64,
}
