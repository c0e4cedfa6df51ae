//! vSphere Automation REST connector.
//!
//! Opens a session with `POST /api/session` (basic auth) and authenticates
//! every subsequent request with the `vmware-api-session-id` header. The REST
//! surface is flatter than the managed-object tree, so placement (cluster and
//! datacenter of each host, host of each VM) is recovered through filtered
//! list calls and attached as [`ParentRef`] chains.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use virtsync_core::native::{
    AboutInfo, DatastoreSummary, GuestInfo, HostHardware, HostRuntime, NativeCluster,
    NativeDatacenter, NativeDatastore, NativeDevice, NativeDisk, NativeHost, NativeHostRef,
    NativeNetwork, NativeNic, NativeVm, ParentKind, ParentRef, VmConfig, VmRuntime,
};
use virtsync_core::status::PlatformType;
use virtsync_core::types::DbId;

use crate::error::InventoryError;
use crate::session::{ConnectParams, InventoryConnector, InventorySession};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Connector for vCenter endpoints speaking the Automation REST API.
#[derive(Debug, Clone, Default)]
pub struct VSphereRestConnector;

impl VSphereRestConnector {
    pub fn new() -> Self {
        Self
    }

    fn build_client(params: &ConnectParams) -> Result<reqwest::Client, InventoryError> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(!params.verify_tls)
            .timeout(params.timeout)
            .build()
            .map_err(InventoryError::from)
    }
}

#[async_trait]
impl InventoryConnector for VSphereRestConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn InventorySession>, InventoryError> {
        if !matches!(params.platform_type, PlatformType::Vcenter | PlatformType::Esxi) {
            return Err(InventoryError::Unsupported(params.platform_type.to_string()));
        }
        let client = Self::build_client(params)?;
        let base_url = params.base_url();

        let response = client
            .post(format!("{base_url}/api/session"))
            .basic_auth(&params.username, Some(&params.secret))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(InventoryError::Auth(format!(
                "{} rejected credentials for {}",
                params.address, params.username
            )));
        }
        let response = ensure_success(response).await?;
        let token: String = response
            .json()
            .await
            .map_err(|e| InventoryError::Decode(e.to_string()))?;

        tracing::info!(
            platform_id = params.platform_id,
            address = %params.address,
            "Opened inventory session",
        );

        Ok(Box::new(RestSession {
            client,
            base_url,
            platform_id: params.platform_id,
            platform_type: params.platform_type,
            token: Mutex::new(Some(token)),
        }))
    }
}

/// An open REST session.
pub struct RestSession {
    client: reqwest::Client,
    base_url: String,
    platform_id: DbId,
    platform_type: PlatformType,
    token: Mutex<Option<String>>,
}

impl RestSession {
    async fn token(&self) -> Result<String, InventoryError> {
        self.token
            .lock()
            .await
            .clone()
            .ok_or(InventoryError::SessionClosed)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, InventoryError> {
        let token = self.token().await?;
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header(SESSION_HEADER, token)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Host id -> (host name, placement chain).
    async fn host_placement(
        &self,
    ) -> Result<HashMap<String, (String, Option<ParentRef>)>, InventoryError> {
        let datacenters: Vec<DatacenterSummary> = self.get("/api/vcenter/datacenter").await?;
        let clusters: Vec<ClusterSummary> = self.get("/api/vcenter/cluster").await?;

        let mut dc_of_host: HashMap<String, String> = HashMap::new();
        let mut dc_of_cluster: HashMap<String, String> = HashMap::new();
        for dc in &datacenters {
            let hosts: Vec<HostSummary> = self
                .get(&format!("/api/vcenter/host?datacenters={}", dc.datacenter))
                .await?;
            for h in hosts {
                dc_of_host.insert(h.host, dc.name.clone());
            }
            let in_dc: Vec<ClusterSummary> = self
                .get(&format!("/api/vcenter/cluster?datacenters={}", dc.datacenter))
                .await?;
            for c in in_dc {
                dc_of_cluster.insert(c.cluster, dc.name.clone());
            }
        }

        let mut cluster_of_host: HashMap<String, (String, Option<String>)> = HashMap::new();
        for cluster in &clusters {
            let hosts: Vec<HostSummary> = self
                .get(&format!("/api/vcenter/host?clusters={}", cluster.cluster))
                .await?;
            for h in hosts {
                cluster_of_host.insert(
                    h.host,
                    (
                        cluster.name.clone(),
                        dc_of_cluster.get(&cluster.cluster).cloned(),
                    ),
                );
            }
        }

        let hosts: Vec<HostSummary> = self.get("/api/vcenter/host").await?;
        Ok(hosts
            .into_iter()
            .map(|h| {
                let chain = placement_chain(
                    cluster_of_host.get(&h.host).map(|(c, _)| c.as_str()),
                    cluster_of_host
                        .get(&h.host)
                        .and_then(|(_, dc)| dc.as_deref())
                        .or_else(|| dc_of_host.get(&h.host).map(String::as_str)),
                );
                (h.host, (h.name, chain))
            })
            .collect())
    }

    async fn guest_identity(&self, vm_id: &str) -> Option<GuestIdentity> {
        match self
            .get::<GuestIdentity>(&format!("/api/vcenter/vm/{vm_id}/guest/identity"))
            .await
        {
            Ok(identity) => Some(identity),
            Err(e) => {
                // Tools not running answers 503; the guest section stays empty.
                tracing::debug!(vm = %vm_id, error = %e, "Guest identity unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl InventorySession for RestSession {
    async fn about(&self) -> Result<AboutInfo, InventoryError> {
        let version: ApplianceVersion = self.get("/api/appliance/system/version").await?;
        Ok(map_about(version, self.platform_type))
    }

    async fn list_datacenters(&self) -> Result<Vec<NativeDatacenter>, InventoryError> {
        let rows: Vec<DatacenterSummary> = self.get("/api/vcenter/datacenter").await?;
        Ok(rows
            .into_iter()
            .map(|r| NativeDatacenter {
                mo_ref: r.datacenter,
                name: r.name,
            })
            .collect())
    }

    async fn list_clusters(&self) -> Result<Vec<NativeCluster>, InventoryError> {
        let rows: Vec<ClusterSummary> = self.get("/api/vcenter/cluster").await?;
        Ok(rows
            .into_iter()
            .map(|r| NativeCluster {
                mo_ref: r.cluster,
                name: r.name,
            })
            .collect())
    }

    async fn list_hosts(&self) -> Result<Vec<NativeHost>, InventoryError> {
        let placement = self.host_placement().await?;
        let hosts: Vec<HostSummary> = self.get("/api/vcenter/host").await?;

        let mut out = Vec::with_capacity(hosts.len());
        for summary in hosts {
            let vms: Vec<VmSummary> = self
                .get(&format!("/api/vcenter/vm?hosts={}", summary.host))
                .await?;
            let parent = placement.get(&summary.host).and_then(|(_, p)| p.clone());
            out.push(map_host(&self.base_url, summary, parent, vms.len()));
        }
        Ok(out)
    }

    async fn list_vms(&self) -> Result<Vec<NativeVm>, InventoryError> {
        let placement = self.host_placement().await?;

        let mut host_of_vm: HashMap<String, String> = HashMap::new();
        for host_id in placement.keys() {
            let vms: Vec<VmSummary> = self
                .get(&format!("/api/vcenter/vm?hosts={host_id}"))
                .await?;
            for vm in vms {
                host_of_vm.insert(vm.vm, host_id.clone());
            }
        }

        let summaries: Vec<VmSummary> = self.get("/api/vcenter/vm").await?;
        let mut out = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let detail: VmDetail = self.get(&format!("/api/vcenter/vm/{}", summary.vm)).await?;
            let guest = if detail.power_state.as_deref() == Some("POWERED_ON") {
                self.guest_identity(&summary.vm).await
            } else {
                None
            };
            let host = host_of_vm
                .get(&summary.vm)
                .and_then(|id| placement.get(id))
                .map(|(name, parent)| NativeHostRef {
                    name: name.clone(),
                    parent: parent.clone(),
                });
            out.push(map_vm(summary.vm, detail, host, guest));
        }
        Ok(out)
    }

    async fn list_datastores(&self) -> Result<Vec<NativeDatastore>, InventoryError> {
        let datacenters: Vec<DatacenterSummary> = self.get("/api/vcenter/datacenter").await?;
        let mut dc_of_ds: HashMap<String, String> = HashMap::new();
        for dc in &datacenters {
            let rows: Vec<DatastoreListItem> = self
                .get(&format!("/api/vcenter/datastore?datacenters={}", dc.datacenter))
                .await?;
            for row in rows {
                dc_of_ds.insert(row.datastore, dc.name.clone());
            }
        }

        let rows: Vec<DatastoreListItem> = self.get("/api/vcenter/datastore").await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let detail: DatastoreDetail = self
                .get(&format!("/api/vcenter/datastore/{}", row.datastore))
                .await?;
            let parent = dc_of_ds
                .get(&row.datastore)
                .map(|dc| ParentRef::new(ParentKind::Datacenter, dc.clone()));
            out.push(map_datastore(row, detail, parent));
        }
        Ok(out)
    }

    async fn list_networks(&self) -> Result<Vec<NativeNetwork>, InventoryError> {
        let rows: Vec<NetworkSummary> = self.get("/api/vcenter/network").await?;
        Ok(rows
            .into_iter()
            .map(|r| NativeNetwork {
                mo_ref: r.network,
                name: r.name,
                network_type: r.network_type.unwrap_or_default(),
            })
            .collect())
    }

    async fn disconnect(&self) -> Result<(), InventoryError> {
        let Some(token) = self.token.lock().await.take() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(format!("{}/api/session", self.base_url))
            .header(SESSION_HEADER, token)
            .send()
            .await?;
        check_status(response).await?;
        tracing::info!(platform_id = self.platform_id, "Closed inventory session");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Ensure the response has a 2xx status, otherwise return an `Api` error.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, InventoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(InventoryError::Auth(body));
    }
    Err(InventoryError::Api {
        status: status.as_u16(),
        body,
    })
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, InventoryError> {
    let response = ensure_success(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| InventoryError::Decode(e.to_string()))
}

async fn check_status(response: reqwest::Response) -> Result<(), InventoryError> {
    ensure_success(response).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApplianceVersion {
    #[serde(default)]
    version: String,
    #[serde(default)]
    build: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct DatacenterSummary {
    datacenter: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ClusterSummary {
    cluster: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct HostSummary {
    host: String,
    name: String,
    #[serde(default)]
    connection_state: Option<String>,
    #[serde(default)]
    power_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmDetail {
    name: String,
    identity: Option<VmIdentity>,
    #[serde(rename = "guest_OS")]
    guest_os: Option<String>,
    hardware: Option<VmHardware>,
    cpu: Option<VmCpu>,
    memory: Option<VmMemory>,
    power_state: Option<String>,
    disks: BTreeMap<String, VmDiskInfo>,
    nics: BTreeMap<String, VmNicInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmIdentity {
    bios_uuid: Option<String>,
    instance_uuid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmHardware {
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmCpu {
    count: Option<u32>,
    cores_per_socket: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmMemory {
    #[serde(rename = "size_MiB")]
    size_mib: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmDiskInfo {
    label: String,
    /// Bytes.
    capacity: Option<u64>,
    backing: Option<DiskBacking>,
    scsi: Option<BusAddress>,
    sata: Option<BusAddress>,
    ide: Option<IdeAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiskBacking {
    vmdk_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BusAddress {
    bus: Option<i32>,
    unit: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdeAddress {
    primary: Option<bool>,
    master: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmNicInfo {
    label: String,
    #[serde(rename = "type")]
    adapter_type: Option<String>,
    mac_type: Option<String>,
    mac_address: Option<String>,
    backing: Option<NicBacking>,
    state: Option<String>,
    start_connected: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NicBacking {
    network_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GuestIdentity {
    ip_address: Option<String>,
    host_name: Option<String>,
    full_name: Option<LocalizableMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocalizableMessage {
    default_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatastoreListItem {
    datastore: String,
    name: String,
    #[serde(rename = "type", default)]
    ds_type: Option<String>,
    #[serde(default)]
    free_space: Option<u64>,
    #[serde(default)]
    capacity: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatastoreDetail {
    accessible: Option<bool>,
    multiple_host_access: Option<bool>,
    free_space: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NetworkSummary {
    network: String,
    name: String,
    #[serde(rename = "type", default)]
    network_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// `POWERED_ON` -> `poweredOn`, `NOT_RESPONDING` -> `notResponding`.
fn upper_snake_to_camel(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, word) in value.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars);
            }
        }
    }
    out
}

fn placement_chain(cluster: Option<&str>, datacenter: Option<&str>) -> Option<ParentRef> {
    let dc = datacenter.map(|name| ParentRef::new(ParentKind::Datacenter, name));
    match (cluster, dc) {
        (Some(cluster), Some(dc)) => Some(ParentRef::new(ParentKind::Cluster, cluster).within(dc)),
        (Some(cluster), None) => Some(ParentRef::new(ParentKind::Cluster, cluster)),
        (None, dc) => dc,
    }
}

fn map_about(version: ApplianceVersion, platform_type: PlatformType) -> AboutInfo {
    let api_type = match platform_type {
        PlatformType::Esxi => "HostAgent",
        _ => "VirtualCenter",
    };
    AboutInfo {
        name: version.product,
        full_name: version.summary,
        vendor: "VMware, Inc.".into(),
        version: version.version.clone(),
        build: version.build,
        api_type: api_type.into(),
        api_version: version.version,
        instance_uuid: String::new(),
    }
}

/// The REST surface does not expose the BIOS UUID of a host, so the identity
/// key is the host id qualified by the endpoint, which is stable for the
/// lifetime of the host's registration.
fn map_host(
    base_url: &str,
    summary: HostSummary,
    parent: Option<ParentRef>,
    vm_count: usize,
) -> NativeHost {
    let endpoint = base_url.trim_start_matches("https://");
    NativeHost {
        hardware: Some(HostHardware {
            uuid: Some(format!("{endpoint}/{}", summary.host)),
            ..Default::default()
        }),
        runtime: Some(HostRuntime {
            connection_state: summary.connection_state.as_deref().map(upper_snake_to_camel),
            power_state: summary.power_state.as_deref().map(upper_snake_to_camel),
            ..Default::default()
        }),
        mo_ref: summary.host,
        name: summary.name,
        parent,
        vm_count: u32::try_from(vm_count).unwrap_or(u32::MAX),
        ..Default::default()
    }
}

fn map_vm(
    mo_ref: String,
    detail: VmDetail,
    host: Option<NativeHostRef>,
    guest: Option<GuestIdentity>,
) -> NativeVm {
    let identity = detail.identity.unwrap_or_default();
    let cpu = detail.cpu.unwrap_or_default();

    let mut devices = Vec::with_capacity(detail.disks.len() + detail.nics.len());
    for (key, disk) in detail.disks {
        devices.push(NativeDevice::Disk(NativeDisk {
            key: key.parse().unwrap_or_default(),
            label: disk.label,
            unit_number: disk
                .scsi
                .as_ref()
                .or(disk.sata.as_ref())
                .and_then(|a| a.unit)
                .or_else(|| disk.ide.as_ref().map(ide_unit)),
            controller_key: disk.scsi.as_ref().or(disk.sata.as_ref()).and_then(|a| a.bus),
            capacity_kb: disk.capacity.map(|bytes| bytes / 1024),
            file_name: disk.backing.and_then(|b| b.vmdk_file),
            thin_provisioned: None,
            disk_mode: None,
        }));
    }
    for (key, nic) in detail.nics {
        devices.push(NativeDevice::Ethernet(NativeNic {
            key: key.parse().unwrap_or_default(),
            label: nic.label,
            adapter_type: nic.adapter_type.map(|t| t.to_ascii_lowercase()),
            mac_address: nic.mac_address,
            address_type: nic.mac_type.as_deref().map(upper_snake_to_camel),
            network_name: nic.backing.and_then(|b| b.network_name),
            connected: nic.state.as_deref() == Some("CONNECTED"),
            start_connected: nic.start_connected,
        }));
    }

    let guest_info = guest.map(|g| GuestInfo {
        ip_address: g.ip_address,
        host_name: g.host_name,
        guest_state: Some("running".into()),
        ..Default::default()
    });

    let parent = host.as_ref().and_then(|h| h.parent.clone());

    NativeVm {
        mo_ref,
        name: detail.name.clone(),
        parent,
        resource_pool: None,
        config: Some(VmConfig {
            name: Some(detail.name),
            uuid: identity.bios_uuid,
            instance_uuid: identity.instance_uuid,
            template: false,
            guest_id: detail.guest_os,
            guest_full_name: None,
            version: detail.hardware.and_then(|h| h.version).map(|v| {
                v.strip_prefix("VMX_")
                    .map(|n| format!("vmx-{n}"))
                    .unwrap_or(v)
            }),
            num_cpu: cpu.count,
            num_cores_per_socket: cpu.cores_per_socket,
            memory_mb: detail.memory.and_then(|m| m.size_mib),
            devices,
        }),
        runtime: Some(VmRuntime {
            power_state: detail.power_state.as_deref().map(upper_snake_to_camel),
            connection_state: Some("connected".into()),
            host,
            ..Default::default()
        }),
        guest: guest_info,
        quick_stats: None,
        snapshot: None,
    }
}

fn ide_unit(address: &IdeAddress) -> i32 {
    match (address.primary.unwrap_or(true), address.master.unwrap_or(true)) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    }
}

fn map_datastore(
    row: DatastoreListItem,
    detail: DatastoreDetail,
    parent: Option<ParentRef>,
) -> NativeDatastore {
    NativeDatastore {
        summary: Some(DatastoreSummary {
            fs_type: row.ds_type,
            url: None,
            capacity_bytes: row.capacity,
            free_bytes: detail.free_space.or(row.free_space),
            uncommitted_bytes: None,
            accessible: detail.accessible,
            maintenance_mode: None,
            multiple_host_access: detail.multiple_host_access,
        }),
        mo_ref: row.datastore,
        name: row.name,
        parent,
        nas: None,
        host_mounts: Vec::new(),
        vm_count: 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use virtsync_core::normalize::{ancestor_name, normalize_datastore, normalize_vm};
    use virtsync_core::status::{DatastoreType, VmStatus};

    use super::*;

    #[test]
    fn enum_constants_become_camel_case() {
        assert_eq!(upper_snake_to_camel("POWERED_ON"), "poweredOn");
        assert_eq!(upper_snake_to_camel("NOT_RESPONDING"), "notResponding");
        assert_eq!(upper_snake_to_camel("CONNECTED"), "connected");
        assert_eq!(upper_snake_to_camel(""), "");
    }

    #[test]
    fn placement_chain_links_cluster_to_datacenter() {
        let chain = placement_chain(Some("prod"), Some("dc1"));
        assert_eq!(ancestor_name(chain.as_ref(), ParentKind::Cluster), "prod");
        assert_eq!(ancestor_name(chain.as_ref(), ParentKind::Datacenter), "dc1");

        let standalone = placement_chain(None, Some("dc1"));
        assert_eq!(ancestor_name(standalone.as_ref(), ParentKind::Cluster), "");
        assert!(placement_chain(None, None).is_none());
    }

    #[test]
    fn host_identity_is_qualified_by_endpoint() {
        let summary: HostSummary = serde_json::from_value(serde_json::json!({
            "host": "host-12",
            "name": "10.0.0.11",
            "connection_state": "CONNECTED",
            "power_state": "POWERED_ON"
        }))
        .unwrap();
        let host = map_host("https://vc01.lab:443", summary, None, 4);

        let hardware = host.hardware.unwrap();
        assert_eq!(hardware.uuid.as_deref(), Some("vc01.lab:443/host-12"));
        assert_eq!(
            host.runtime.unwrap().connection_state.as_deref(),
            Some("connected")
        );
        assert_eq!(host.vm_count, 4);
    }

    #[test]
    fn vm_detail_maps_into_a_normalizable_record() {
        let detail: VmDetail = serde_json::from_value(serde_json::json!({
            "name": "web01",
            "identity": {"bios_uuid": "4201-aaaa", "instance_uuid": "5001-bbbb"},
            "guest_OS": "UBUNTU_64",
            "hardware": {"version": "VMX_19"},
            "cpu": {"count": 4, "cores_per_socket": 2},
            "memory": {"size_MiB": 8192},
            "power_state": "POWERED_ON",
            "disks": {
                "2000": {
                    "label": "Hard disk 1",
                    "capacity": 42949672960u64,
                    "backing": {"vmdk_file": "[ds1] web01/web01.vmdk"},
                    "scsi": {"bus": 0, "unit": 0}
                }
            },
            "nics": {
                "4000": {
                    "label": "Network adapter 1",
                    "type": "VMXNET3",
                    "mac_type": "ASSIGNED",
                    "mac_address": "00:50:56:aa:bb:cc",
                    "backing": {"network_name": "VM Network"},
                    "state": "CONNECTED",
                    "start_connected": true
                }
            }
        }))
        .unwrap();

        let host = NativeHostRef {
            name: "10.0.0.11".into(),
            parent: placement_chain(Some("prod"), Some("dc1")),
        };
        let vm = map_vm("vm-101".into(), detail, Some(host), None);
        let record = normalize_vm(&vm).unwrap();

        assert_eq!(record.uuid, "4201-aaaa");
        assert_eq!(record.status, VmStatus::Running);
        assert_eq!(record.hardware_version, "vmx-19");
        assert_eq!(record.memory_mb, 8192);
        assert_eq!(record.host_name, "10.0.0.11");
        assert_eq!(record.cluster_name, "prod");
        assert_eq!(record.datacenter_name, "dc1");
        assert_eq!(record.disks.len(), 1);
        assert_eq!(record.disks[0].capacity_gb, 40);
        assert_eq!(record.disks[0].datastore_name, "ds1");
        assert_eq!(record.networks[0].network_name, "VM Network");
        assert_eq!(record.mac_address, "00:50:56:aa:bb:cc");
    }

    #[test]
    fn datastore_prefers_detail_free_space() {
        let row: DatastoreListItem = serde_json::from_value(serde_json::json!({
            "datastore": "datastore-1",
            "name": "nfs-share",
            "type": "NFS41",
            "free_space": 1,
            "capacity": 107374182400u64
        }))
        .unwrap();
        let detail = DatastoreDetail {
            accessible: Some(true),
            multiple_host_access: Some(true),
            free_space: Some(53687091200),
        };
        let ds = map_datastore(row, detail, None);
        let record = normalize_datastore(&ds).unwrap();

        assert_eq!(record.datastore_type, DatastoreType::Nfs41);
        assert_eq!(record.capacity_gb, 100);
        assert_eq!(record.free_gb, 50);
        assert_eq!(record.usage_percent, 50.0);
    }
}
