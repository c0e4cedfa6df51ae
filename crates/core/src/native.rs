//! Platform-native inventory records.
//!
//! These mirror the managed-object shapes a vCenter/ESXi control plane
//! reports: nested hardware, runtime, guest and device sections, every one
//! of which may be absent. Nothing here is validated; the
//! [`normalize`](crate::normalize) module is the single seam where these
//! records are checked and flattened.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Inventory hierarchy
// ---------------------------------------------------------------------------

/// Kind of a managed object appearing in a parent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Datacenter,
    Cluster,
    ComputeResource,
    Folder,
    ResourcePool,
    Other,
}

/// One link in an object's parent chain (folder → cluster → datacenter ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    pub kind: ParentKind,
    pub name: String,
    #[serde(default)]
    pub parent: Option<Box<ParentRef>>,
}

impl ParentRef {
    pub fn new(kind: ParentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            parent: None,
        }
    }

    /// Attach a grandparent link, returning the extended chain.
    pub fn within(mut self, parent: ParentRef) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Iterate this link and every ancestor, nearest first.
    pub fn chain(&self) -> impl Iterator<Item = &ParentRef> {
        std::iter::successors(Some(self), |p| p.parent.as_deref())
    }
}

/// Result of the control plane's "about" call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AboutInfo {
    pub name: String,
    pub full_name: String,
    pub vendor: String,
    pub version: String,
    pub build: String,
    pub api_type: String,
    pub api_version: String,
    pub instance_uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeDatacenter {
    pub mo_ref: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeCluster {
    pub mo_ref: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeNetwork {
    pub mo_ref: String,
    pub name: String,
    pub network_type: String,
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostHardware {
    /// Stable hardware (BIOS) UUID; the host's identity key.
    pub uuid: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub cpu_model: Option<String>,
    pub num_cpu_pkgs: Option<u32>,
    pub num_cpu_cores: Option<u32>,
    pub num_cpu_threads: Option<u32>,
    /// Per-core clock in Hz.
    pub cpu_hz: Option<u64>,
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRuntime {
    pub connection_state: Option<String>,
    pub power_state: Option<String>,
    pub in_maintenance_mode: bool,
    pub boot_time: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub product_version: Option<String>,
    pub product_build: Option<String>,
    pub dns_hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostQuickStats {
    pub overall_cpu_usage_mhz: Option<u64>,
    pub overall_memory_usage_mb: Option<u64>,
    pub uptime_secs: Option<u64>,
}

/// A compute host as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeHost {
    pub mo_ref: String,
    /// Inventory name; usually the management address.
    pub name: String,
    pub parent: Option<ParentRef>,
    pub hardware: Option<HostHardware>,
    pub runtime: Option<HostRuntime>,
    pub config: Option<HostConfig>,
    pub quick_stats: Option<HostQuickStats>,
    /// Number of VMs registered on the host.
    pub vm_count: u32,
}

// ---------------------------------------------------------------------------
// Virtual machine
// ---------------------------------------------------------------------------

/// A virtual device attached to a VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeDevice {
    Disk(NativeDisk),
    Ethernet(NativeNic),
    Other { key: i32, label: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeDisk {
    pub key: i32,
    pub label: String,
    pub unit_number: Option<i32>,
    pub controller_key: Option<i32>,
    pub capacity_kb: Option<u64>,
    /// Backing file, e.g. `[datastore1] web01/web01.vmdk`.
    pub file_name: Option<String>,
    pub thin_provisioned: Option<bool>,
    pub disk_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeNic {
    pub key: i32,
    pub label: String,
    /// Adapter model, e.g. `vmxnet3`, `e1000e`.
    pub adapter_type: Option<String>,
    pub mac_address: Option<String>,
    pub address_type: Option<String>,
    pub network_name: Option<String>,
    pub connected: bool,
    pub start_connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub name: Option<String>,
    /// BIOS UUID; the VM's identity key.
    pub uuid: Option<String>,
    pub instance_uuid: Option<String>,
    pub template: bool,
    pub guest_id: Option<String>,
    pub guest_full_name: Option<String>,
    /// Virtual hardware version, e.g. `vmx-19`.
    pub version: Option<String>,
    pub num_cpu: Option<u32>,
    pub num_cores_per_socket: Option<u32>,
    pub memory_mb: Option<u64>,
    pub devices: Vec<NativeDevice>,
}

/// Reference to the host a VM is running on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeHostRef {
    pub name: String,
    pub parent: Option<ParentRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmRuntime {
    pub power_state: Option<String>,
    pub connection_state: Option<String>,
    pub host: Option<NativeHostRef>,
    pub boot_time: Option<Timestamp>,
    /// CPU entitlement ceiling in MHz.
    pub max_cpu_usage_mhz: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestInfo {
    pub tools_status: Option<String>,
    pub tools_version: Option<String>,
    pub guest_state: Option<String>,
    pub ip_address: Option<String>,
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmQuickStats {
    pub overall_cpu_usage_mhz: Option<u64>,
    pub guest_memory_usage_mb: Option<u64>,
}

/// One node of a VM's snapshot tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeSnapshot {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub create_time: Option<Timestamp>,
    /// Power state captured with the snapshot.
    pub state: Option<String>,
    pub quiesced: bool,
    pub children: Vec<NativeSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotInfo {
    pub current_snapshot: Option<i64>,
    pub root_snapshots: Vec<NativeSnapshot>,
}

/// A virtual machine (or template) as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeVm {
    pub mo_ref: String,
    pub name: String,
    /// Containing folder chain.
    pub parent: Option<ParentRef>,
    pub resource_pool: Option<String>,
    pub config: Option<VmConfig>,
    pub runtime: Option<VmRuntime>,
    pub guest: Option<GuestInfo>,
    pub quick_stats: Option<VmQuickStats>,
    pub snapshot: Option<SnapshotInfo>,
}

impl NativeVm {
    /// Templates are VMs whose config carries the template flag.
    pub fn is_template(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.template)
    }
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreSummary {
    /// Filesystem type as reported, e.g. `VMFS`, `NFS41`, `vsan`.
    #[serde(rename = "type")]
    pub fs_type: Option<String>,
    pub url: Option<String>,
    pub capacity_bytes: Option<u64>,
    pub free_bytes: Option<u64>,
    pub uncommitted_bytes: Option<u64>,
    pub accessible: Option<bool>,
    /// `normal`, `enteringMaintenance` or `inMaintenance`.
    pub maintenance_mode: Option<String>,
    pub multiple_host_access: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NasInfo {
    pub remote_host: Option<String>,
    pub remote_path: Option<String>,
}

/// A storage resource as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeDatastore {
    pub mo_ref: String,
    pub name: String,
    pub parent: Option<ParentRef>,
    pub summary: Option<DatastoreSummary>,
    pub nas: Option<NasInfo>,
    /// Names of the hosts that mount this datastore.
    pub host_mounts: Vec<String>,
    pub vm_count: u32,
}
