//! Record normalizer: platform-native records in, canonical records out.
//!
//! Every function here is pure. Mandatory identity fields are checked and
//! reported as [`ParseError`]; everything else defaults to empty or zero.
//! Derived percentages never divide by zero and are clamped to `[0, 100]`.

use crate::native::{
    AboutInfo, NativeDatastore, NativeDevice, NativeHost, NativeSnapshot, NativeVm, ParentKind,
    ParentRef,
};
use crate::records::{
    DatastoreRecord, HostMetricSample, HostRecord, PlatformInfoRecord, TemplateRecord,
    VmDiskRecord, VmMetricSample, VmNetworkRecord, VmRecord, VmSnapshotRecord,
};
use crate::status::{AccessMode, DatastoreType, DiskProvisioning, HostStatus, OsType, VmStatus};
use crate::types::{bytes_to_gb, bytes_to_mb, hz_to_mhz, kb_to_gb, saturating_i64};

/// A native record lacked a field required to identify it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{entity} '{name}' is missing mandatory field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
        name: String,
    },
}

impl ParseError {
    fn missing(entity: &'static str, field: &'static str, name: &str) -> Self {
        Self::MissingField {
            entity,
            field,
            name: name.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Derivation helpers
// ---------------------------------------------------------------------------

/// `used / total` as a percentage in `[0, 100]`; 0 when `total` is not positive.
pub fn usage_percent(used: f64, total: f64) -> f64 {
    if !used.is_finite() || !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    round2((used / total * 100.0).clamp(0.0, 100.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Ordered OS family table. First case-insensitive substring hit wins, so
/// `rhel` must precede the generic `linux` entry.
const OS_TABLE: &[(&str, OsType)] = &[
    ("win", OsType::Windows),
    ("centos", OsType::Centos),
    ("ubuntu", OsType::Ubuntu),
    ("debian", OsType::Debian),
    ("rhel", OsType::Redhat),
    ("redhat", OsType::Redhat),
    ("linux", OsType::Linux),
];

/// Classify a guest identifier (e.g. `centos7_64Guest`) into an OS family.
pub fn classify_os(guest_id: &str) -> OsType {
    let lowered = guest_id.to_ascii_lowercase();
    OS_TABLE
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, os)| *os)
        .unwrap_or(OsType::Other)
}

/// Name of the nearest ancestor of `kind`, or empty when the chain has none.
pub fn ancestor_name(parent: Option<&ParentRef>, kind: ParentKind) -> String {
    parent
        .into_iter()
        .flat_map(ParentRef::chain)
        .find(|p| p.kind == kind)
        .map(|p| p.name.clone())
        .unwrap_or_default()
}

/// Split a backing file name such as `[ds1] web/web.vmdk` into
/// (`ds1`, `web/web.vmdk`). Unbracketed names yield an empty datastore.
fn split_backing_file(file_name: &str) -> (String, String) {
    if let Some(rest) = file_name.strip_prefix('[') {
        if let Some((ds, path)) = rest.split_once(']') {
            return (ds.to_string(), path.trim_start().to_string());
        }
    }
    (String::new(), file_name.to_string())
}

fn map_host_status(connection_state: &str, in_maintenance: bool) -> HostStatus {
    match connection_state {
        "connected" if in_maintenance => HostStatus::Maintenance,
        "connected" => HostStatus::Online,
        "disconnected" | "notResponding" => HostStatus::Offline,
        _ => HostStatus::Unknown,
    }
}

fn map_vm_status(power_state: &str) -> VmStatus {
    match power_state {
        "poweredOn" => VmStatus::Running,
        "poweredOff" => VmStatus::Stopped,
        "suspended" => VmStatus::Suspended,
        _ => VmStatus::Unknown,
    }
}

fn map_datastore_type(fs_type: &str) -> DatastoreType {
    match fs_type.to_ascii_lowercase().as_str() {
        "nfs" => DatastoreType::Nfs,
        "nfs41" => DatastoreType::Nfs41,
        "vsan" => DatastoreType::Vsan,
        "vvol" => DatastoreType::Vvol,
        _ => DatastoreType::Vmfs,
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Platform-level facts from the about call plus enumeration counts.
pub fn normalize_platform_info(
    about: &AboutInfo,
    datacenters: &[String],
    total_clusters: usize,
    total_hosts: usize,
    total_vms: usize,
) -> PlatformInfoRecord {
    let count = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
    PlatformInfoRecord {
        version: about.version.clone(),
        build: about.build.clone(),
        datacenter: datacenters.first().cloned().unwrap_or_default(),
        total_hosts: count(total_hosts),
        total_vms: count(total_vms),
        total_clusters: count(total_clusters),
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub fn normalize_host(host: &NativeHost) -> Result<HostRecord, ParseError> {
    let hardware = host.hardware.clone().unwrap_or_default();
    let uuid = hardware
        .uuid
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ParseError::missing("host", "hardware.uuid", &host.name))?;

    let runtime = host.runtime.clone().unwrap_or_default();
    let config = host.config.clone().unwrap_or_default();
    let stats = host.quick_stats.clone().unwrap_or_default();

    let connection_state = runtime.connection_state.unwrap_or_default();
    let cores = hardware.num_cpu_cores.unwrap_or(0);
    let cpu_mhz = hardware.cpu_hz.map(hz_to_mhz).unwrap_or(0);
    let memory_total_mb = hardware.memory_bytes.map(bytes_to_mb).unwrap_or(0);

    // Overall usage is reported across all cores, so capacity is cores x clock.
    let cpu_capacity_mhz = cpu_mhz as f64 * f64::from(cores);
    let cpu_usage = usage_percent(
        stats.overall_cpu_usage_mhz.unwrap_or(0) as f64,
        cpu_capacity_mhz,
    );
    let memory_usage = usage_percent(
        stats.overall_memory_usage_mb.unwrap_or(0) as f64,
        memory_total_mb as f64,
    );

    Ok(HostRecord {
        uuid,
        name: host.name.clone(),
        hostname: config.dns_hostname.unwrap_or_else(|| host.name.clone()),
        ip_address: host.name.clone(),
        mo_ref: host.mo_ref.clone(),
        cluster_name: ancestor_name(host.parent.as_ref(), ParentKind::Cluster),
        datacenter_name: ancestor_name(host.parent.as_ref(), ParentKind::Datacenter),
        status: map_host_status(&connection_state, runtime.in_maintenance_mode),
        power_state: runtime.power_state.unwrap_or_default(),
        connection_state,
        vendor: hardware.vendor.unwrap_or_default(),
        model: hardware.model.unwrap_or_default(),
        esxi_version: config.product_version.unwrap_or_default(),
        esxi_build: config.product_build.unwrap_or_default(),
        cpu_model: hardware.cpu_model.unwrap_or_default(),
        cpu_cores: to_i32(cores),
        cpu_threads: to_i32(hardware.num_cpu_threads.unwrap_or(0)),
        cpu_sockets: to_i32(hardware.num_cpu_pkgs.unwrap_or(0)),
        cpu_frequency_mhz: i32::try_from(cpu_mhz).unwrap_or(i32::MAX),
        memory_total_mb,
        vm_count: to_i32(host.vm_count),
        cpu_usage,
        memory_usage,
        in_maintenance: runtime.in_maintenance_mode,
    })
}

pub fn host_metric_sample(host: &NativeHost) -> Result<HostMetricSample, ParseError> {
    let record = normalize_host(host)?;
    let stats = host.quick_stats.clone().unwrap_or_default();
    Ok(HostMetricSample {
        uuid: record.uuid,
        cpu_usage_percent: record.cpu_usage,
        cpu_usage_mhz: saturating_i64(stats.overall_cpu_usage_mhz.unwrap_or(0)),
        memory_usage_percent: record.memory_usage,
        memory_used_mb: saturating_i64(stats.overall_memory_usage_mb.unwrap_or(0)),
        uptime_secs: saturating_i64(stats.uptime_secs.unwrap_or(0)),
    })
}

// ---------------------------------------------------------------------------
// Virtual machine
// ---------------------------------------------------------------------------

pub fn normalize_vm(vm: &NativeVm) -> Result<VmRecord, ParseError> {
    let config = vm
        .config
        .as_ref()
        .ok_or_else(|| ParseError::missing("vm", "config", &vm.name))?;
    let uuid = config
        .uuid
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ParseError::missing("vm", "config.uuid", &vm.name))?;

    let runtime = vm.runtime.clone().unwrap_or_default();
    let guest = vm.guest.clone().unwrap_or_default();
    let stats = vm.quick_stats.clone().unwrap_or_default();
    let host = runtime.host.clone().unwrap_or_default();

    let power_state = runtime.power_state.clone().unwrap_or_default();
    let guest_id = config.guest_id.clone().unwrap_or_default();
    let memory_mb = config.memory_mb.map(saturating_i64).unwrap_or(0);

    let disks = normalize_disks(&config.devices);
    let networks = normalize_networks(&config.devices);
    let snapshots = flatten_snapshots(vm);

    let cpu_usage_percent = usage_percent(
        stats.overall_cpu_usage_mhz.unwrap_or(0) as f64,
        runtime.max_cpu_usage_mhz.unwrap_or(0) as f64,
    );
    let memory_usage_percent = usage_percent(
        stats.guest_memory_usage_mb.unwrap_or(0) as f64,
        memory_mb as f64,
    );

    let name = config.name.clone().unwrap_or_else(|| vm.name.clone());
    let count = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);

    Ok(VmRecord {
        uuid,
        instance_uuid: config.instance_uuid.clone().unwrap_or_default(),
        display_name: name.clone(),
        name,
        mo_ref: vm.mo_ref.clone(),
        host_name: host.name.clone(),
        cluster_name: ancestor_name(host.parent.as_ref(), ParentKind::Cluster),
        datacenter_name: ancestor_name(vm.parent.as_ref(), ParentKind::Datacenter),
        resource_pool: vm.resource_pool.clone().unwrap_or_default(),
        folder: vm
            .parent
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default(),
        status: map_vm_status(&power_state),
        power_state,
        connection_state: runtime.connection_state.unwrap_or_default(),
        os_type: classify_os(&guest_id),
        os_full_name: config.guest_full_name.clone().unwrap_or_default(),
        guest_id,
        guest_state: guest.guest_state.unwrap_or_default(),
        tools_status: guest.tools_status.unwrap_or_default(),
        tools_version: guest.tools_version.unwrap_or_default(),
        cpu_count: to_i32(config.num_cpu.unwrap_or(0)),
        cpu_cores_per_socket: to_i32(config.num_cores_per_socket.unwrap_or(0)),
        memory_mb,
        hardware_version: config.version.clone().unwrap_or_default(),
        ip_address: guest.ip_address.filter(|ip| !ip.is_empty()),
        mac_address: networks
            .first()
            .map(|n| n.mac_address.clone())
            .unwrap_or_default(),
        hostname: guest.host_name.unwrap_or_default(),
        disk_count: count(disks.len()),
        total_disk_gb: disks.iter().map(|d| d.capacity_gb).sum(),
        network_count: count(networks.len()),
        cpu_usage_percent,
        memory_usage_percent,
        has_snapshots: !snapshots.is_empty(),
        snapshot_count: count(snapshots.len()),
        is_template: config.template,
        boot_time: runtime.boot_time,
        disks,
        networks,
        snapshots,
    })
}

fn normalize_disks(devices: &[NativeDevice]) -> Vec<VmDiskRecord> {
    devices
        .iter()
        .filter_map(|device| match device {
            NativeDevice::Disk(disk) => Some(disk),
            _ => None,
        })
        .map(|disk| {
            let (datastore_name, file_path) =
                split_backing_file(disk.file_name.as_deref().unwrap_or_default());
            VmDiskRecord {
                device_key: disk.key,
                label: disk.label.clone(),
                unit_number: disk.unit_number,
                controller_key: disk.controller_key,
                datastore_name,
                file_path,
                capacity_gb: disk.capacity_kb.map(kb_to_gb).unwrap_or(0),
                provisioning: if disk.thin_provisioned.unwrap_or(false) {
                    DiskProvisioning::Thin
                } else {
                    DiskProvisioning::Thick
                },
                disk_mode: disk.disk_mode.clone().unwrap_or_default(),
            }
        })
        .collect()
}

fn normalize_networks(devices: &[NativeDevice]) -> Vec<VmNetworkRecord> {
    devices
        .iter()
        .filter_map(|device| match device {
            NativeDevice::Ethernet(nic) => Some(nic),
            _ => None,
        })
        .map(|nic| VmNetworkRecord {
            device_key: nic.key,
            label: nic.label.clone(),
            network_name: nic.network_name.clone().unwrap_or_default(),
            adapter_type: nic.adapter_type.clone().unwrap_or_default(),
            mac_address: nic.mac_address.clone().unwrap_or_default(),
            mac_type: nic.address_type.clone().unwrap_or_default(),
            connected: nic.connected,
            start_connected: nic.start_connected,
        })
        .collect()
}

/// Flatten the snapshot tree depth-first. Each record carries its parent's
/// snapshot id; roots carry `None`.
pub fn flatten_snapshots(vm: &NativeVm) -> Vec<VmSnapshotRecord> {
    let Some(info) = vm.snapshot.as_ref() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut stack: Vec<(&NativeSnapshot, Option<i64>)> =
        info.root_snapshots.iter().rev().map(|s| (s, None)).collect();

    while let Some((node, parent)) = stack.pop() {
        out.push(VmSnapshotRecord {
            snapshot_id: node.id,
            parent_snapshot_id: parent,
            name: node.name.clone(),
            description: node.description.clone(),
            is_current: info.current_snapshot == Some(node.id),
            is_quiesced: node.quiesced,
            power_state: node.state.clone().unwrap_or_default(),
            snapshot_time: node.create_time,
        });
        stack.extend(node.children.iter().rev().map(|c| (c, Some(node.id))));
    }
    out
}

pub fn vm_metric_sample(vm: &NativeVm) -> Result<VmMetricSample, ParseError> {
    let record = normalize_vm(vm)?;
    let stats = vm.quick_stats.clone().unwrap_or_default();
    Ok(VmMetricSample {
        uuid: record.uuid,
        cpu_usage_percent: record.cpu_usage_percent,
        cpu_usage_mhz: saturating_i64(stats.overall_cpu_usage_mhz.unwrap_or(0)),
        memory_usage_percent: record.memory_usage_percent,
        memory_used_mb: saturating_i64(stats.guest_memory_usage_mb.unwrap_or(0)),
    })
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

pub fn normalize_template(vm: &NativeVm) -> Result<TemplateRecord, ParseError> {
    let config = vm.config.clone().unwrap_or_default();
    let uuid = config
        .uuid
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ParseError::missing("template", "config.uuid", &vm.name))?;

    let name = config.name.clone().unwrap_or_else(|| vm.name.clone());
    Ok(TemplateRecord {
        uuid,
        display_name: name.clone(),
        name,
        mo_ref: vm.mo_ref.clone(),
        os_type: classify_os(config.guest_id.as_deref().unwrap_or_default()),
        cpu_count: to_i32(config.num_cpu.unwrap_or(0)),
        memory_mb: config.memory_mb.map(saturating_i64).unwrap_or(0),
        disk_gb: normalize_disks(&config.devices)
            .iter()
            .map(|d| d.capacity_gb)
            .sum(),
        category: String::new(),
    })
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

pub fn normalize_datastore(ds: &NativeDatastore) -> Result<DatastoreRecord, ParseError> {
    if ds.name.is_empty() {
        return Err(ParseError::missing("datastore", "name", &ds.mo_ref));
    }

    let summary = ds.summary.clone().unwrap_or_default();
    let nas = ds.nas.clone().unwrap_or_default();

    let capacity = summary.capacity_bytes.unwrap_or(0);
    let free = summary.free_bytes.unwrap_or(0);
    let accessible = summary.accessible.unwrap_or(true);
    let usage = usage_percent(capacity as f64 - free as f64, capacity as f64);

    Ok(DatastoreRecord {
        name: ds.name.clone(),
        mo_ref: ds.mo_ref.clone(),
        url: summary.url.unwrap_or_default(),
        datastore_type: map_datastore_type(summary.fs_type.as_deref().unwrap_or_default()),
        access_mode: if accessible {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly
        },
        datacenter_name: ancestor_name(ds.parent.as_ref(), ParentKind::Datacenter),
        capacity_gb: bytes_to_gb(capacity),
        free_gb: bytes_to_gb(free),
        uncommitted_gb: bytes_to_gb(summary.uncommitted_bytes.unwrap_or(0)),
        usage_percent: usage,
        vm_count: to_i32(ds.vm_count),
        nfs_server: nas.remote_host.unwrap_or_default(),
        nfs_path: nas.remote_path.unwrap_or_default(),
        is_accessible: accessible,
        is_maintenance: summary
            .maintenance_mode
            .as_deref()
            .is_some_and(|m| m != "normal"),
        multiple_host_access: summary.multiple_host_access.unwrap_or(true),
        host_names: ds.host_mounts.clone(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::native::{
        DatastoreSummary, HostHardware, HostQuickStats, HostRuntime, NativeDisk, NativeNic,
        SnapshotInfo, VmConfig, VmQuickStats, VmRuntime,
    };
    use crate::types::GB;

    fn host(uuid: Option<&str>) -> NativeHost {
        NativeHost {
            mo_ref: "host-10".into(),
            name: "10.0.0.11".into(),
            parent: Some(
                ParentRef::new(ParentKind::Cluster, "prod-cluster")
                    .within(ParentRef::new(ParentKind::Folder, "host").within(
                        ParentRef::new(ParentKind::Datacenter, "dc-east"),
                    )),
            ),
            hardware: Some(HostHardware {
                uuid: uuid.map(str::to_string),
                num_cpu_pkgs: Some(2),
                num_cpu_cores: Some(16),
                num_cpu_threads: Some(32),
                cpu_hz: Some(2_400_000_000),
                memory_bytes: Some(256 * GB),
                ..Default::default()
            }),
            runtime: Some(HostRuntime {
                connection_state: Some("connected".into()),
                power_state: Some("poweredOn".into()),
                ..Default::default()
            }),
            config: None,
            quick_stats: Some(HostQuickStats {
                overall_cpu_usage_mhz: Some(9_600),
                overall_memory_usage_mb: Some(128 * 1024),
                uptime_secs: Some(3_600),
            }),
            vm_count: 4,
        }
    }

    fn vm(uuid: &str) -> NativeVm {
        NativeVm {
            mo_ref: "vm-42".into(),
            name: "web01".into(),
            parent: Some(
                ParentRef::new(ParentKind::Folder, "web")
                    .within(ParentRef::new(ParentKind::Datacenter, "dc-east")),
            ),
            config: Some(VmConfig {
                uuid: Some(uuid.into()),
                guest_id: Some("rhel8_64Guest".into()),
                num_cpu: Some(4),
                num_cores_per_socket: Some(2),
                memory_mb: Some(8192),
                devices: vec![
                    NativeDevice::Disk(NativeDisk {
                        key: 2000,
                        label: "Hard disk 1".into(),
                        capacity_kb: Some(40 * 1024 * 1024),
                        file_name: Some("[ds1] web01/web01.vmdk".into()),
                        thin_provisioned: Some(true),
                        ..Default::default()
                    }),
                    NativeDevice::Ethernet(NativeNic {
                        key: 4000,
                        label: "Network adapter 1".into(),
                        mac_address: Some("00:50:56:aa:bb:cc".into()),
                        network_name: Some("VM Network".into()),
                        connected: true,
                        ..Default::default()
                    }),
                    NativeDevice::Other {
                        key: 100,
                        label: "PCI controller 0".into(),
                    },
                ],
                ..Default::default()
            }),
            runtime: Some(VmRuntime {
                power_state: Some("poweredOn".into()),
                max_cpu_usage_mhz: Some(9_600),
                ..Default::default()
            }),
            quick_stats: Some(VmQuickStats {
                overall_cpu_usage_mhz: Some(2_400),
                guest_memory_usage_mb: Some(2048),
            }),
            ..Default::default()
        }
    }

    // -- helpers -----------------------------------------------------------

    #[test]
    fn usage_percent_guards_zero_and_overflow() {
        assert_eq!(usage_percent(50.0, 0.0), 0.0);
        assert_eq!(usage_percent(50.0, -1.0), 0.0);
        assert_eq!(usage_percent(300.0, 100.0), 100.0);
        assert_eq!(usage_percent(-5.0, 100.0), 0.0);
        assert_eq!(usage_percent(25.0, 100.0), 25.0);
        assert_eq!(usage_percent(f64::NAN, 100.0), 0.0);
    }

    #[test]
    fn os_classification_follows_table_order() {
        assert_eq!(classify_os("windows2019srv_64Guest"), OsType::Windows);
        assert_eq!(classify_os("centos7_64Guest"), OsType::Centos);
        assert_eq!(classify_os("UBUNTU64Guest"), OsType::Ubuntu);
        assert_eq!(classify_os("debian11_64Guest"), OsType::Debian);
        assert_eq!(classify_os("rhel9_64Guest"), OsType::Redhat);
        assert_eq!(classify_os("otherLinux64Guest"), OsType::Linux);
        assert_eq!(classify_os("freebsd13_64Guest"), OsType::Other);
        assert_eq!(classify_os(""), OsType::Other);
    }

    #[test]
    fn ancestor_walk_skips_intermediate_folders() {
        let chain = ParentRef::new(ParentKind::Folder, "vm")
            .within(ParentRef::new(ParentKind::Datacenter, "dc1"));
        assert_eq!(ancestor_name(Some(&chain), ParentKind::Datacenter), "dc1");
        assert_eq!(ancestor_name(Some(&chain), ParentKind::Cluster), "");
        assert_eq!(ancestor_name(None, ParentKind::Datacenter), "");
    }

    // -- host --------------------------------------------------------------

    #[test]
    fn host_is_flattened_with_hierarchy_and_usage() {
        let record = normalize_host(&host(Some("4c4c-0001"))).unwrap();
        assert_eq!(record.uuid, "4c4c-0001");
        assert_eq!(record.cluster_name, "prod-cluster");
        assert_eq!(record.datacenter_name, "dc-east");
        assert_eq!(record.status, HostStatus::Online);
        assert_eq!(record.cpu_frequency_mhz, 2_400);
        assert_eq!(record.memory_total_mb, 256 * 1024);
        assert_eq!(record.ip_address, "10.0.0.11");
        assert_eq!(record.hostname, "10.0.0.11");
        // 9600 MHz of 16 x 2400 MHz
        assert_eq!(record.cpu_usage, 25.0);
        assert_eq!(record.memory_usage, 50.0);
    }

    #[test]
    fn host_record_carries_status_id_on_the_wire() {
        let record = normalize_host(&host(Some("4c4c-0001"))).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], 1);

        let back: HostRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn host_without_uuid_is_a_parse_error() {
        let err = normalize_host(&host(None)).unwrap_err();
        assert_matches!(err, ParseError::MissingField { entity: "host", .. });

        let mut bare = host(Some("x"));
        bare.hardware = None;
        assert!(normalize_host(&bare).is_err());
    }

    #[test]
    fn host_in_maintenance_maps_to_maintenance_status() {
        let mut h = host(Some("u"));
        h.runtime.as_mut().unwrap().in_maintenance_mode = true;
        assert_eq!(normalize_host(&h).unwrap().status, HostStatus::Maintenance);

        h.runtime = None;
        assert_eq!(normalize_host(&h).unwrap().status, HostStatus::Unknown);
    }

    #[test]
    fn host_usage_is_bounded_when_overcommitted() {
        let mut h = host(Some("u"));
        h.quick_stats.as_mut().unwrap().overall_cpu_usage_mhz = Some(1_000_000);
        h.hardware.as_mut().unwrap().memory_bytes = None;
        let record = normalize_host(&h).unwrap();
        assert_eq!(record.cpu_usage, 100.0);
        assert_eq!(record.memory_usage, 0.0);
    }

    // -- vm ----------------------------------------------------------------

    #[test]
    fn vm_is_flattened_with_devices() {
        let record = normalize_vm(&vm("4201-aaaa")).unwrap();
        assert_eq!(record.status, VmStatus::Running);
        assert_eq!(record.os_type, OsType::Redhat);
        assert_eq!(record.folder, "web");
        assert_eq!(record.datacenter_name, "dc-east");
        assert_eq!(record.disk_count, 1);
        assert_eq!(record.total_disk_gb, 40);
        assert_eq!(record.network_count, 1);
        assert_eq!(record.mac_address, "00:50:56:aa:bb:cc");
        assert_eq!(record.cpu_usage_percent, 25.0);
        assert_eq!(record.memory_usage_percent, 25.0);
        assert!(!record.has_snapshots);

        let disk = &record.disks[0];
        assert_eq!(disk.datastore_name, "ds1");
        assert_eq!(disk.file_path, "web01/web01.vmdk");
        assert_eq!(disk.provisioning, DiskProvisioning::Thin);
    }

    #[test]
    fn vm_without_config_or_uuid_is_a_parse_error() {
        let mut v = vm("u");
        v.config.as_mut().unwrap().uuid = None;
        assert_matches!(
            normalize_vm(&v),
            Err(ParseError::MissingField { field: "config.uuid", .. })
        );

        v.config = None;
        assert_matches!(
            normalize_vm(&v),
            Err(ParseError::MissingField { field: "config", .. })
        );
    }

    #[test]
    fn vm_unknown_power_state_maps_to_unknown() {
        let mut v = vm("u");
        v.runtime = None;
        let record = normalize_vm(&v).unwrap();
        assert_eq!(record.status, VmStatus::Unknown);
        assert_eq!(record.cpu_usage_percent, 0.0);
    }

    #[test]
    fn snapshot_tree_is_flattened_with_parent_ids() {
        let mut v = vm("u");
        v.snapshot = Some(SnapshotInfo {
            current_snapshot: Some(3),
            root_snapshots: vec![NativeSnapshot {
                id: 1,
                name: "base".into(),
                children: vec![
                    NativeSnapshot {
                        id: 2,
                        name: "patch".into(),
                        children: vec![NativeSnapshot {
                            id: 3,
                            name: "upgrade".into(),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                    NativeSnapshot {
                        id: 4,
                        name: "branch".into(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
        });

        let record = normalize_vm(&v).unwrap();
        assert_eq!(record.snapshot_count, 4);
        assert!(record.has_snapshots);

        let parents: Vec<(i64, Option<i64>)> = record
            .snapshots
            .iter()
            .map(|s| (s.snapshot_id, s.parent_snapshot_id))
            .collect();
        assert_eq!(parents, vec![(1, None), (2, Some(1)), (3, Some(2)), (4, Some(1))]);

        let current: Vec<i64> = record
            .snapshots
            .iter()
            .filter(|s| s.is_current)
            .map(|s| s.snapshot_id)
            .collect();
        assert_eq!(current, vec![3]);
    }

    #[test]
    fn vm_metric_sample_reuses_usage_derivation() {
        let sample = vm_metric_sample(&vm("4201-aaaa")).unwrap();
        assert_eq!(sample.uuid, "4201-aaaa");
        assert_eq!(sample.cpu_usage_mhz, 2_400);
        assert_eq!(sample.memory_used_mb, 2048);
        assert_eq!(sample.cpu_usage_percent, 25.0);
    }

    // -- template ----------------------------------------------------------

    #[test]
    fn template_sums_disk_capacity() {
        let mut t = vm("tpl-1");
        t.config.as_mut().unwrap().template = true;
        let record = normalize_template(&t).unwrap();
        assert_eq!(record.uuid, "tpl-1");
        assert_eq!(record.disk_gb, 40);
        assert_eq!(record.os_type, OsType::Redhat);

        t.config = None;
        assert!(normalize_template(&t).is_err());
    }

    // -- datastore ---------------------------------------------------------

    #[test]
    fn datastore_type_and_usage() {
        let ds = NativeDatastore {
            mo_ref: "datastore-1".into(),
            name: "nfs-share".into(),
            summary: Some(DatastoreSummary {
                fs_type: Some("NFS41".into()),
                capacity_bytes: Some(1000 * GB),
                free_bytes: Some(250 * GB),
                accessible: Some(false),
                maintenance_mode: Some("normal".into()),
                ..Default::default()
            }),
            host_mounts: vec!["10.0.0.11".into()],
            ..Default::default()
        };
        let record = normalize_datastore(&ds).unwrap();
        assert_eq!(record.datastore_type, DatastoreType::Nfs41);
        assert_eq!(record.access_mode, AccessMode::ReadOnly);
        assert_eq!(record.capacity_gb, 1000);
        assert_eq!(record.usage_percent, 75.0);
        assert!(!record.is_maintenance);
        assert_eq!(record.host_names, vec!["10.0.0.11".to_string()]);
    }

    #[test]
    fn datastore_free_above_capacity_clamps_to_zero() {
        let ds = NativeDatastore {
            name: "odd".into(),
            summary: Some(DatastoreSummary {
                fs_type: Some("exotic".into()),
                capacity_bytes: Some(GB),
                free_bytes: Some(2 * GB),
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = normalize_datastore(&ds).unwrap();
        assert_eq!(record.usage_percent, 0.0);
        assert_eq!(record.datastore_type, DatastoreType::Vmfs);
        assert_eq!(record.access_mode, AccessMode::ReadWrite);
    }

    #[test]
    fn datastore_without_name_is_a_parse_error() {
        assert!(normalize_datastore(&NativeDatastore::default()).is_err());
    }

    #[test]
    fn platform_info_takes_first_datacenter() {
        let about = AboutInfo {
            version: "8.0.2".into(),
            build: "22385739".into(),
            ..Default::default()
        };
        let info = normalize_platform_info(&about, &["dc-east".into(), "dc-west".into()], 2, 5, 40);
        assert_eq!(info.datacenter, "dc-east");
        assert_eq!(info.total_hosts, 5);
        assert_eq!(info.total_vms, 40);
        assert_eq!(info.total_clusters, 2);

        let empty = normalize_platform_info(&about, &[], 0, 0, 0);
        assert_eq!(empty.datacenter, "");
    }
}
