//! In-process [`SyncStore`](crate::store::SyncStore).
//!
//! Mirrors the PostgreSQL semantics the pipeline depends on (unique identity
//! keys, upsert-reactivates, soft delete by absence, snapshot parent links)
//! without a database. Used by tests and by offline runs of the worker.
//! Failure switches let tests simulate an unavailable store or rejected rows.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use virtsync_core::records::{
    DatastoreRecord, HostMetricSample, HostRecord, PlatformInfoRecord, TemplateRecord,
    VmDiskRecord, VmMetricSample, VmNetworkRecord, VmRecord, VmSnapshotRecord,
};
use virtsync_core::status::{OperationStatus, PlatformStatus};
use virtsync_core::task_state::TaskState;
use virtsync_core::types::{DbId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::models::datastore::Datastore;
use crate::models::host::Host;
use crate::models::metrics::{HostMetric, VmMetric};
use crate::models::operation::{
    CreateOperationLog, CreateOperationTask, FinishOperationLog, OperationLog, OperationTask,
};
use crate::models::platform::{CreatePlatform, Platform, PlatformCredential};
use crate::models::template::VmTemplate;
use crate::models::vm::{VirtualMachine, VmDisk, VmNetwork, VmSnapshot};
use crate::store::{InventoryStore, MetricsStore, OperationStore, PlatformStore, Upserted};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    platforms: BTreeMap<DbId, Platform>,
    credentials: BTreeMap<DbId, PlatformCredential>,
    hosts: BTreeMap<DbId, Host>,
    vms: BTreeMap<DbId, VirtualMachine>,
    disks: BTreeMap<DbId, VmDisk>,
    networks: BTreeMap<DbId, VmNetwork>,
    snapshots: BTreeMap<DbId, VmSnapshot>,
    datastores: BTreeMap<DbId, Datastore>,
    datastore_hosts: BTreeSet<(DbId, DbId)>,
    templates: BTreeMap<DbId, VmTemplate>,
    host_metrics: Vec<HostMetric>,
    vm_metrics: Vec<VmMetric>,
    tasks: BTreeMap<DbId, OperationTask>,
    logs: BTreeMap<DbId, OperationLog>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn host_id_by_name(&self, platform_id: DbId, name: &str) -> Option<DbId> {
        let mut matches: Vec<&Host> = self
            .hosts
            .values()
            .filter(|h| h.platform_id == platform_id && h.name == name)
            .collect();
        matches.sort_by_key(|h| (!h.is_active, h.id));
        matches.first().map(|h| h.id)
    }
}

/// Store holding every table in memory behind a `tokio::sync::RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    fail_deactivation: AtomicBool,
    rejected_keys: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- failure switches -------------------------------------------------

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every `deactivate_*_except` call fail.
    pub fn set_fail_deactivation(&self, fail: bool) {
        self.fail_deactivation.store(fail, Ordering::SeqCst);
    }

    /// Reject upserts of the record with this identity key (uuid or name).
    pub async fn reject_key(&self, key: impl Into<String>) {
        self.rejected_keys.write().await.insert(key.into());
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    async fn check_key(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        if self.rejected_keys.read().await.contains(key) {
            return Err(StoreError::Constraint(format!("row {key} rejected")));
        }
        Ok(())
    }

    fn check_deactivation(&self) -> StoreResult<()> {
        self.check()?;
        if self.fail_deactivation.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("deactivation switched off".into()));
        }
        Ok(())
    }

    // -- seeding ----------------------------------------------------------

    pub async fn insert_platform(&self, input: CreatePlatform) -> Platform {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let now = Utc::now();
        let platform = Platform {
            id,
            name: input.name,
            platform_type: input.platform_type.as_str().to_string(),
            address: input.address,
            port: input.port.unwrap_or(443),
            verify_tls: input.verify_tls.unwrap_or(false),
            status_id: PlatformStatus::Disconnected.id(),
            is_active: true,
            region: input.region.unwrap_or_default(),
            datacenter: String::new(),
            version: String::new(),
            build: String::new(),
            total_hosts: 0,
            total_vms: 0,
            total_clusters: 0,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        t.platforms.insert(id, platform.clone());
        platform
    }

    pub async fn insert_credential(
        &self,
        platform_id: DbId,
        username: &str,
        secret: &str,
    ) -> PlatformCredential {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let now = Utc::now();
        let credential = PlatformCredential {
            id,
            platform_id,
            username: username.to_string(),
            secret: secret.to_string(),
            session_token: None,
            session_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        t.credentials.insert(platform_id, credential.clone());
        credential
    }

    pub async fn set_platform_active(&self, platform_id: DbId, active: bool) {
        if let Some(p) = self.tables.write().await.platforms.get_mut(&platform_id) {
            p.is_active = active;
        }
    }

    pub async fn remove_platform(&self, platform_id: DbId) {
        self.tables.write().await.platforms.remove(&platform_id);
    }

    // -- inspection -------------------------------------------------------

    pub async fn platform(&self, id: DbId) -> Option<Platform> {
        self.tables.read().await.platforms.get(&id).cloned()
    }

    pub async fn hosts(&self, platform_id: DbId) -> Vec<Host> {
        let t = self.tables.read().await;
        t.hosts
            .values()
            .filter(|h| h.platform_id == platform_id)
            .cloned()
            .collect()
    }

    pub async fn vms(&self, platform_id: DbId) -> Vec<VirtualMachine> {
        let t = self.tables.read().await;
        t.vms
            .values()
            .filter(|v| v.platform_id == platform_id)
            .cloned()
            .collect()
    }

    pub async fn disks(&self, vm_id: DbId) -> Vec<VmDisk> {
        let t = self.tables.read().await;
        t.disks.values().filter(|d| d.vm_id == vm_id).cloned().collect()
    }

    pub async fn networks(&self, vm_id: DbId) -> Vec<VmNetwork> {
        let t = self.tables.read().await;
        t.networks
            .values()
            .filter(|n| n.vm_id == vm_id)
            .cloned()
            .collect()
    }

    pub async fn snapshots(&self, vm_id: DbId) -> Vec<VmSnapshot> {
        let t = self.tables.read().await;
        t.snapshots
            .values()
            .filter(|s| s.vm_id == vm_id)
            .cloned()
            .collect()
    }

    pub async fn datastores(&self, platform_id: DbId) -> Vec<Datastore> {
        let t = self.tables.read().await;
        t.datastores
            .values()
            .filter(|d| d.platform_id == platform_id)
            .cloned()
            .collect()
    }

    pub async fn datastore_host_ids(&self, datastore_id: DbId) -> Vec<DbId> {
        let t = self.tables.read().await;
        t.datastore_hosts
            .iter()
            .filter(|(ds, _)| *ds == datastore_id)
            .map(|(_, host)| *host)
            .collect()
    }

    pub async fn templates(&self, platform_id: DbId) -> Vec<VmTemplate> {
        let t = self.tables.read().await;
        t.templates
            .values()
            .filter(|tpl| tpl.platform_id == platform_id)
            .cloned()
            .collect()
    }

    pub async fn tasks(&self) -> Vec<OperationTask> {
        self.tables.read().await.tasks.values().cloned().collect()
    }

    pub async fn logs(&self) -> Vec<OperationLog> {
        self.tables.read().await.logs.values().cloned().collect()
    }

    pub async fn host_metrics(&self) -> Vec<HostMetric> {
        self.tables.read().await.host_metrics.clone()
    }

    pub async fn vm_metrics(&self) -> Vec<VmMetric> {
        self.tables.read().await.vm_metrics.clone()
    }
}

// ---------------------------------------------------------------------------
// PlatformStore
// ---------------------------------------------------------------------------

#[async_trait]
impl PlatformStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn find_platform(&self, id: DbId) -> StoreResult<Option<Platform>> {
        self.check()?;
        Ok(self.tables.read().await.platforms.get(&id).cloned())
    }

    async fn list_active_platforms(&self) -> StoreResult<Vec<Platform>> {
        self.check()?;
        let t = self.tables.read().await;
        Ok(t.platforms.values().filter(|p| p.is_active).cloned().collect())
    }

    async fn find_credential(&self, platform_id: DbId) -> StoreResult<Option<PlatformCredential>> {
        self.check()?;
        Ok(self.tables.read().await.credentials.get(&platform_id).cloned())
    }

    async fn update_platform_info(
        &self,
        platform_id: DbId,
        info: &PlatformInfoRecord,
    ) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        let p = t.platforms.get_mut(&platform_id).ok_or(StoreError::NotFound {
            entity: "platform",
            id: platform_id,
        })?;
        p.version = info.version.clone();
        p.build = info.build.clone();
        if !info.datacenter.is_empty() {
            p.datacenter = info.datacenter.clone();
        }
        p.total_hosts = info.total_hosts;
        p.total_vms = info.total_vms;
        p.total_clusters = info.total_clusters;
        p.updated_at = Utc::now();
        Ok(())
    }

    async fn set_platform_status(
        &self,
        platform_id: DbId,
        status: PlatformStatus,
    ) -> StoreResult<PlatformStatus> {
        self.check()?;
        let mut t = self.tables.write().await;
        let p = t.platforms.get_mut(&platform_id).ok_or(StoreError::NotFound {
            entity: "platform",
            id: platform_id,
        })?;
        let previous = PlatformStatus::from_id(p.status_id).unwrap_or(PlatformStatus::Disconnected);
        p.status_id = status.id();
        p.updated_at = Utc::now();
        Ok(previous)
    }

    async fn touch_last_sync(&self, platform_id: DbId, at: Timestamp) -> StoreResult<()> {
        self.check()?;
        if let Some(p) = self.tables.write().await.platforms.get_mut(&platform_id) {
            p.last_sync_at = Some(at);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InventoryStore
// ---------------------------------------------------------------------------

fn apply_host(row: &mut Host, rec: &HostRecord, now: Timestamp) {
    row.name = rec.name.clone();
    row.hostname = rec.hostname.clone();
    row.ip_address = rec.ip_address.clone();
    row.mo_ref = rec.mo_ref.clone();
    row.cluster_name = rec.cluster_name.clone();
    row.datacenter_name = rec.datacenter_name.clone();
    row.status_id = rec.status.id();
    row.power_state = rec.power_state.clone();
    row.connection_state = rec.connection_state.clone();
    row.vendor = rec.vendor.clone();
    row.model = rec.model.clone();
    row.esxi_version = rec.esxi_version.clone();
    row.esxi_build = rec.esxi_build.clone();
    row.cpu_model = rec.cpu_model.clone();
    row.cpu_cores = rec.cpu_cores;
    row.cpu_threads = rec.cpu_threads;
    row.cpu_sockets = rec.cpu_sockets;
    row.cpu_frequency_mhz = rec.cpu_frequency_mhz;
    row.memory_total_mb = rec.memory_total_mb;
    row.vm_count = rec.vm_count;
    row.cpu_usage = rec.cpu_usage;
    row.memory_usage = rec.memory_usage;
    row.in_maintenance = rec.in_maintenance;
    row.is_active = true;
    row.last_seen_at = now;
    row.updated_at = now;
}

fn apply_vm(row: &mut VirtualMachine, rec: &VmRecord, host_id: Option<DbId>, now: Timestamp) {
    row.host_id = host_id;
    row.instance_uuid = rec.instance_uuid.clone();
    row.name = rec.name.clone();
    row.display_name = rec.display_name.clone();
    row.mo_ref = rec.mo_ref.clone();
    row.cluster_name = rec.cluster_name.clone();
    row.datacenter_name = rec.datacenter_name.clone();
    row.resource_pool = rec.resource_pool.clone();
    row.folder = rec.folder.clone();
    row.status_id = rec.status.id();
    row.power_state = rec.power_state.clone();
    row.connection_state = rec.connection_state.clone();
    row.os_type = rec.os_type.as_str().to_string();
    row.os_full_name = rec.os_full_name.clone();
    row.guest_id = rec.guest_id.clone();
    row.guest_state = rec.guest_state.clone();
    row.tools_status = rec.tools_status.clone();
    row.tools_version = rec.tools_version.clone();
    row.cpu_count = rec.cpu_count;
    row.cpu_cores_per_socket = rec.cpu_cores_per_socket;
    row.memory_mb = rec.memory_mb;
    row.hardware_version = rec.hardware_version.clone();
    row.ip_address = rec.ip_address.clone();
    row.mac_address = rec.mac_address.clone();
    row.hostname = rec.hostname.clone();
    row.disk_count = rec.disk_count;
    row.total_disk_gb = rec.total_disk_gb;
    row.network_count = rec.network_count;
    row.cpu_usage_percent = rec.cpu_usage_percent;
    row.memory_usage_percent = rec.memory_usage_percent;
    row.has_snapshots = rec.has_snapshots;
    row.snapshot_count = rec.snapshot_count;
    row.is_template = rec.is_template;
    row.boot_time = rec.boot_time;
    row.is_active = true;
    row.last_seen_at = now;
    row.updated_at = now;
}

fn apply_datastore(row: &mut Datastore, rec: &DatastoreRecord, now: Timestamp) {
    row.mo_ref = rec.mo_ref.clone();
    row.url = rec.url.clone();
    row.datastore_type = rec.datastore_type.as_str().to_string();
    row.access_mode = rec.access_mode.as_str().to_string();
    row.datacenter_name = rec.datacenter_name.clone();
    row.capacity_gb = rec.capacity_gb;
    row.free_gb = rec.free_gb;
    row.uncommitted_gb = rec.uncommitted_gb;
    row.usage_percent = rec.usage_percent;
    row.vm_count = rec.vm_count;
    row.nfs_server = rec.nfs_server.clone();
    row.nfs_path = rec.nfs_path.clone();
    row.is_accessible = rec.is_accessible;
    row.is_maintenance = rec.is_maintenance;
    row.multiple_host_access = rec.multiple_host_access;
    row.is_active = true;
    row.last_sync_at = now;
    row.updated_at = now;
}

fn apply_template(row: &mut VmTemplate, rec: &TemplateRecord, now: Timestamp) {
    row.name = rec.name.clone();
    row.display_name = rec.display_name.clone();
    row.mo_ref = rec.mo_ref.clone();
    row.os_type = rec.os_type.as_str().to_string();
    row.cpu_count = rec.cpu_count;
    row.memory_mb = rec.memory_mb;
    row.disk_gb = rec.disk_gb;
    row.category = rec.category.clone();
    row.is_active = true;
    row.updated_at = now;
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn upsert_host(&self, platform_id: DbId, record: &HostRecord) -> StoreResult<Upserted> {
        self.check_key(&record.uuid).await?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let existing = t
            .hosts
            .values_mut()
            .find(|h| h.platform_id == platform_id && h.uuid == record.uuid);
        if let Some(row) = existing {
            apply_host(row, record, now);
            return Ok(Upserted::Updated(row.id));
        }

        let id = t.next_id();
        let mut row = Host {
            id,
            platform_id,
            uuid: record.uuid.clone(),
            name: String::new(),
            hostname: String::new(),
            ip_address: String::new(),
            mo_ref: String::new(),
            cluster_name: String::new(),
            datacenter_name: String::new(),
            status_id: 0,
            power_state: String::new(),
            connection_state: String::new(),
            vendor: String::new(),
            model: String::new(),
            esxi_version: String::new(),
            esxi_build: String::new(),
            cpu_model: String::new(),
            cpu_cores: 0,
            cpu_threads: 0,
            cpu_sockets: 0,
            cpu_frequency_mhz: 0,
            memory_total_mb: 0,
            vm_count: 0,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            in_maintenance: false,
            is_active: true,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        };
        apply_host(&mut row, record, now);
        t.hosts.insert(id, row);
        Ok(Upserted::Created(id))
    }

    async fn deactivate_hosts_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        self.check_deactivation()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for row in t.hosts.values_mut() {
            if row.platform_id == platform_id && row.is_active && !seen.contains(&row.uuid) {
                row.is_active = false;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn upsert_vm(&self, platform_id: DbId, record: &VmRecord) -> StoreResult<Upserted> {
        self.check_key(&record.uuid).await?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let host_id = t.host_id_by_name(platform_id, &record.host_name);
        let existing = t
            .vms
            .values_mut()
            .find(|v| v.platform_id == platform_id && v.uuid == record.uuid);
        if let Some(row) = existing {
            apply_vm(row, record, host_id, now);
            return Ok(Upserted::Updated(row.id));
        }

        let id = t.next_id();
        let mut row = VirtualMachine {
            id,
            platform_id,
            host_id: None,
            uuid: record.uuid.clone(),
            instance_uuid: String::new(),
            name: String::new(),
            display_name: String::new(),
            mo_ref: String::new(),
            cluster_name: String::new(),
            datacenter_name: String::new(),
            resource_pool: String::new(),
            folder: String::new(),
            status_id: 0,
            power_state: String::new(),
            connection_state: String::new(),
            os_type: String::new(),
            os_full_name: String::new(),
            guest_id: String::new(),
            guest_state: String::new(),
            tools_status: String::new(),
            tools_version: String::new(),
            cpu_count: 0,
            cpu_cores_per_socket: 0,
            memory_mb: 0,
            hardware_version: String::new(),
            ip_address: None,
            mac_address: String::new(),
            hostname: String::new(),
            disk_count: 0,
            total_disk_gb: 0,
            network_count: 0,
            cpu_usage_percent: 0.0,
            memory_usage_percent: 0.0,
            has_snapshots: false,
            snapshot_count: 0,
            is_template: false,
            is_active: true,
            boot_time: None,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        };
        apply_vm(&mut row, record, host_id, now);
        t.vms.insert(id, row);
        Ok(Upserted::Created(id))
    }

    async fn deactivate_vms_except(&self, platform_id: DbId, seen: &[String]) -> StoreResult<u64> {
        self.check_deactivation()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for row in t.vms.values_mut() {
            if row.platform_id == platform_id
                && row.is_active
                && !row.is_template
                && !seen.contains(&row.uuid)
            {
                row.is_active = false;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn upsert_vm_disk(&self, vm_id: DbId, record: &VmDiskRecord) -> StoreResult<()> {
        self.check()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let existing = t
            .disks
            .values()
            .find(|d| d.vm_id == vm_id && d.device_key == record.device_key)
            .map(|d| d.id);
        let id = match existing {
            Some(id) => id,
            None => t.next_id(),
        };
        t.disks.insert(
            id,
            VmDisk {
                id,
                vm_id,
                device_key: record.device_key,
                label: record.label.clone(),
                unit_number: record.unit_number,
                controller_key: record.controller_key,
                datastore_name: record.datastore_name.clone(),
                file_path: record.file_path.clone(),
                capacity_gb: record.capacity_gb,
                provisioning: record.provisioning.as_str().to_string(),
                disk_mode: record.disk_mode.clone(),
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn delete_vm_disks_except(&self, vm_id: DbId, keys: &[i32]) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let before = t.disks.len();
        t.disks
            .retain(|_, d| d.vm_id != vm_id || keys.contains(&d.device_key));
        Ok((before - t.disks.len()) as u64)
    }

    async fn upsert_vm_network(&self, vm_id: DbId, record: &VmNetworkRecord) -> StoreResult<()> {
        self.check()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let existing = t
            .networks
            .values()
            .find(|n| n.vm_id == vm_id && n.device_key == record.device_key)
            .map(|n| n.id);
        let id = match existing {
            Some(id) => id,
            None => t.next_id(),
        };
        t.networks.insert(
            id,
            VmNetwork {
                id,
                vm_id,
                device_key: record.device_key,
                label: record.label.clone(),
                network_name: record.network_name.clone(),
                adapter_type: record.adapter_type.clone(),
                mac_address: record.mac_address.clone(),
                mac_type: record.mac_type.clone(),
                connected: record.connected,
                start_connected: record.start_connected,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn delete_vm_networks_except(&self, vm_id: DbId, keys: &[i32]) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let before = t.networks.len();
        t.networks
            .retain(|_, n| n.vm_id != vm_id || keys.contains(&n.device_key));
        Ok((before - t.networks.len()) as u64)
    }

    async fn upsert_vm_snapshot(
        &self,
        vm_id: DbId,
        record: &VmSnapshotRecord,
    ) -> StoreResult<()> {
        self.check()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let existing = t
            .snapshots
            .values()
            .find(|s| s.vm_id == vm_id && s.snapshot_id == record.snapshot_id)
            .map(|s| (s.id, s.parent_id));
        let (id, parent_id) = match existing {
            Some(found) => found,
            None => (t.next_id(), None),
        };
        t.snapshots.insert(
            id,
            VmSnapshot {
                id,
                vm_id,
                snapshot_id: record.snapshot_id,
                parent_id,
                name: record.name.clone(),
                description: record.description.clone(),
                is_current: record.is_current,
                is_quiesced: record.is_quiesced,
                power_state: record.power_state.clone(),
                snapshot_time: record.snapshot_time,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn delete_vm_snapshots_except(&self, vm_id: DbId, ids: &[i64]) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let removed: HashSet<DbId> = t
            .snapshots
            .values()
            .filter(|s| s.vm_id == vm_id && !ids.contains(&s.snapshot_id))
            .map(|s| s.id)
            .collect();
        t.snapshots.retain(|id, _| !removed.contains(id));
        // ON DELETE SET NULL
        for s in t.snapshots.values_mut() {
            if s.parent_id.is_some_and(|p| removed.contains(&p)) {
                s.parent_id = None;
            }
        }
        Ok(removed.len() as u64)
    }

    async fn link_vm_snapshot(
        &self,
        vm_id: DbId,
        snapshot_id: i64,
        parent: Option<i64>,
    ) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        let parent_row = parent.and_then(|p| {
            t.snapshots
                .values()
                .find(|s| s.vm_id == vm_id && s.snapshot_id == p)
                .map(|s| s.id)
        });
        if let Some(node) = t
            .snapshots
            .values_mut()
            .find(|s| s.vm_id == vm_id && s.snapshot_id == snapshot_id)
        {
            node.parent_id = parent_row;
        }
        Ok(())
    }

    async fn upsert_datastore(
        &self,
        platform_id: DbId,
        record: &DatastoreRecord,
    ) -> StoreResult<Upserted> {
        self.check_key(&record.name).await?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let existing = t
            .datastores
            .values_mut()
            .find(|d| d.platform_id == platform_id && d.name == record.name);
        if let Some(row) = existing {
            apply_datastore(row, record, now);
            return Ok(Upserted::Updated(row.id));
        }

        let id = t.next_id();
        let mut row = Datastore {
            id,
            platform_id,
            name: record.name.clone(),
            mo_ref: String::new(),
            url: String::new(),
            datastore_type: String::new(),
            access_mode: String::new(),
            datacenter_name: String::new(),
            capacity_gb: 0,
            free_gb: 0,
            uncommitted_gb: 0,
            usage_percent: 0.0,
            vm_count: 0,
            nfs_server: String::new(),
            nfs_path: String::new(),
            is_accessible: true,
            is_maintenance: false,
            multiple_host_access: true,
            is_active: true,
            last_sync_at: now,
            created_at: now,
            updated_at: now,
        };
        apply_datastore(&mut row, record, now);
        t.datastores.insert(id, row);
        Ok(Upserted::Created(id))
    }

    async fn replace_datastore_hosts(
        &self,
        platform_id: DbId,
        datastore_id: DbId,
        host_names: &[String],
    ) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        let host_ids: Vec<DbId> = t
            .hosts
            .values()
            .filter(|h| h.platform_id == platform_id && host_names.contains(&h.name))
            .map(|h| h.id)
            .collect();
        t.datastore_hosts.retain(|(ds, _)| *ds != datastore_id);
        t.datastore_hosts
            .extend(host_ids.into_iter().map(|host| (datastore_id, host)));
        Ok(())
    }

    async fn deactivate_datastores_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        self.check_deactivation()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for row in t.datastores.values_mut() {
            if row.platform_id == platform_id && row.is_active && !seen.contains(&row.name) {
                row.is_active = false;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn upsert_template(
        &self,
        platform_id: DbId,
        record: &TemplateRecord,
    ) -> StoreResult<Upserted> {
        self.check_key(&record.uuid).await?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let existing = t
            .templates
            .values_mut()
            .find(|tpl| tpl.platform_id == platform_id && tpl.uuid == record.uuid);
        if let Some(row) = existing {
            apply_template(row, record, now);
            return Ok(Upserted::Updated(row.id));
        }

        let id = t.next_id();
        let mut row = VmTemplate {
            id,
            platform_id,
            uuid: record.uuid.clone(),
            name: String::new(),
            display_name: String::new(),
            mo_ref: String::new(),
            os_type: String::new(),
            cpu_count: 0,
            memory_mb: 0,
            disk_gb: 0,
            category: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        apply_template(&mut row, record, now);
        t.templates.insert(id, row);
        Ok(Upserted::Created(id))
    }

    async fn deactivate_templates_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        self.check_deactivation()?;
        let now = Utc::now();
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for row in t.templates.values_mut() {
            if row.platform_id == platform_id && row.is_active && !seen.contains(&row.uuid) {
                row.is_active = false;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// MetricsStore
// ---------------------------------------------------------------------------

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn insert_host_metrics(
        &self,
        platform_id: DbId,
        samples: &[HostMetricSample],
        collected_at: Timestamp,
    ) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let mut written = 0;
        for sample in samples {
            let host_id = t
                .hosts
                .values()
                .find(|h| h.platform_id == platform_id && h.uuid == sample.uuid)
                .map(|h| h.id);
            let Some(host_id) = host_id else { continue };
            let id = t.next_id();
            t.host_metrics.push(HostMetric {
                id,
                host_id,
                cpu_usage_percent: sample.cpu_usage_percent,
                cpu_usage_mhz: sample.cpu_usage_mhz,
                memory_usage_percent: sample.memory_usage_percent,
                memory_used_mb: sample.memory_used_mb,
                uptime_secs: sample.uptime_secs,
                collected_at,
            });
            written += 1;
        }
        Ok(written)
    }

    async fn insert_vm_metrics(
        &self,
        platform_id: DbId,
        samples: &[VmMetricSample],
        collected_at: Timestamp,
    ) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let mut written = 0;
        for sample in samples {
            let vm_id = t
                .vms
                .values()
                .find(|v| v.platform_id == platform_id && v.uuid == sample.uuid)
                .map(|v| v.id);
            let Some(vm_id) = vm_id else { continue };
            let id = t.next_id();
            t.vm_metrics.push(VmMetric {
                id,
                vm_id,
                cpu_usage_percent: sample.cpu_usage_percent,
                cpu_usage_mhz: sample.cpu_usage_mhz,
                memory_usage_percent: sample.memory_usage_percent,
                memory_used_mb: sample.memory_used_mb,
                collected_at,
            });
            written += 1;
        }
        Ok(written)
    }

    async fn prune_metrics(&self, cutoff: Timestamp) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write().await;
        let before = t.host_metrics.len() + t.vm_metrics.len();
        t.host_metrics.retain(|m| m.collected_at >= cutoff);
        t.vm_metrics.retain(|m| m.collected_at >= cutoff);
        Ok((before - t.host_metrics.len() - t.vm_metrics.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// OperationStore
// ---------------------------------------------------------------------------

#[async_trait]
impl OperationStore for MemoryStore {
    async fn create_task(&self, input: &CreateOperationTask) -> StoreResult<OperationTask> {
        self.check()?;
        let mut t = self.tables.write().await;
        if t
            .tasks
            .values()
            .any(|task| task.correlation_id == input.correlation_id)
        {
            return Err(StoreError::Constraint(format!(
                "duplicate correlation id {}",
                input.correlation_id
            )));
        }
        let id = t.next_id();
        let now = Utc::now();
        let task = OperationTask {
            id,
            correlation_id: input.correlation_id.clone(),
            task_type: input.task_type.as_str().to_string(),
            name: input.name.clone(),
            platform_id: input.platform_id,
            status_id: OperationStatus::Pending.id(),
            progress: 0,
            current_step: String::new(),
            parameters: input.parameters.clone(),
            result: None,
            error_message: None,
            scheduled_at: input.scheduled_at,
            started_at: None,
            completed_at: None,
            duration_secs: None,
            created_at: now,
            updated_at: now,
        };
        t.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn find_task(&self, correlation_id: &str) -> StoreResult<Option<OperationTask>> {
        self.check()?;
        let t = self.tables.read().await;
        Ok(t
            .tasks
            .values()
            .find(|task| task.correlation_id == correlation_id)
            .cloned())
    }

    async fn save_task_state(
        &self,
        correlation_id: &str,
        expected: OperationStatus,
        state: &TaskState,
    ) -> StoreResult<bool> {
        self.check()?;
        let mut t = self.tables.write().await;
        let Some(task) = t
            .tasks
            .values_mut()
            .find(|task| task.correlation_id == correlation_id && task.status_id == expected.id())
        else {
            return Ok(false);
        };
        task.status_id = state.status.id();
        task.progress = state.progress;
        task.current_step = state.current_step.clone();
        task.result = state.result.clone();
        task.error_message = state.error_message.clone();
        task.started_at = state.started_at;
        task.completed_at = state.completed_at;
        task.duration_secs = state.duration_secs;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn create_log(&self, input: &CreateOperationLog) -> StoreResult<OperationLog> {
        self.check()?;
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let now = Utc::now();
        let log = OperationLog {
            id,
            operation_type: input.operation_type.as_str().to_string(),
            operator: input.operator.clone(),
            target_type: input.target_type.clone(),
            target_id: input.target_id,
            target_name: input.target_name.clone(),
            status_id: OperationStatus::Running.id(),
            result: None,
            error_message: None,
            parameters: input.parameters.clone(),
            started_at: now,
            completed_at: None,
            duration_secs: None,
            created_at: now,
        };
        t.logs.insert(id, log.clone());
        Ok(log)
    }

    async fn finish_log(&self, id: DbId, input: &FinishOperationLog) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write().await;
        if let Some(log) = t.logs.get_mut(&id).filter(|l| l.completed_at.is_none()) {
            log.status_id = input.status.id();
            log.result = input.result.clone();
            log.error_message = input.error_message.clone();
            log.completed_at = Some(input.completed_at);
            log.duration_secs = Some((input.completed_at - log.started_at).num_seconds().max(0));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
