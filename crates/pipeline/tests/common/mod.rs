#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use virtsync_core::native::{
    AboutInfo, DatastoreSummary, HostHardware, HostQuickStats, HostRuntime, NativeDatacenter,
    NativeDatastore, NativeDevice, NativeDisk, NativeHost, NativeHostRef, NativeSnapshot,
    NativeVm, SnapshotInfo, VmConfig, VmQuickStats, VmRuntime,
};
use virtsync_core::status::PlatformType;
use virtsync_db::locks::MemoryLockStore;
use virtsync_db::memory::MemoryStore;
use virtsync_db::models::platform::{CreatePlatform, Platform};
use virtsync_events::RecordingSink;
use virtsync_inventory::{Inventory, StaticConnector};
use virtsync_pipeline::{
    LocalDispatcher, Orchestrator, SyncConfig, SyncContext, SyncService, ThrottleGuard,
};

/// Config with no waiting between retries.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        retry_delay: Duration::ZERO,
        retry_jitter: Duration::ZERO,
        ..SyncConfig::default()
    }
}

/// Everything a sync needs, backed by in-memory stores.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub connector: StaticConnector,
    pub events: RecordingSink,
    pub locks: Arc<MemoryLockStore>,
    pub dispatcher: Arc<LocalDispatcher>,
    pub config: SyncConfig,
}

impl Harness {
    pub fn new(inventory: Inventory) -> Self {
        Self::with_config(inventory, test_config())
    }

    pub fn with_config(inventory: Inventory, config: SyncConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(
            LocalDispatcher::new(config.max_concurrent_jobs).with_store(store.clone()),
        );
        Self {
            store,
            connector: StaticConnector::new(inventory),
            events: RecordingSink::new(),
            locks: Arc::new(MemoryLockStore::new()),
            dispatcher,
            config,
        }
    }

    pub fn context(&self) -> SyncContext {
        SyncContext::new(
            self.store.clone(),
            Arc::new(self.connector.clone()),
            Arc::new(self.events.clone()),
            self.config.clone(),
        )
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.context())
    }

    pub fn service(&self) -> SyncService {
        let throttle = ThrottleGuard::new(self.locks.clone(), self.config.throttle_ttl);
        SyncService::new(self.context(), throttle, self.dispatcher.clone())
    }

    /// An active vCenter platform with a credential.
    pub async fn platform(&self, name: &str) -> Platform {
        let platform = self
            .store
            .insert_platform(CreatePlatform {
                name: name.to_string(),
                platform_type: PlatformType::Vcenter,
                address: format!("{name}.lab"),
                port: None,
                verify_tls: None,
                region: None,
            })
            .await;
        self.store
            .insert_credential(platform.id, "svc-sync", "s3cret")
            .await;
        platform
    }
}

/// Poll until the job with `task_id` is finished.
pub async fn wait_ready(service: &SyncService, task_id: &str) -> virtsync_pipeline::JobStatus {
    for _ in 0..500 {
        if let Some(status) = service.job_status(task_id).await {
            if status.ready {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {task_id} did not finish");
}

// ---------------------------------------------------------------------------
// Inventory builders
// ---------------------------------------------------------------------------

pub fn host(name: &str, uuid: &str) -> NativeHost {
    NativeHost {
        mo_ref: format!("host-{name}"),
        name: name.to_string(),
        hardware: Some(HostHardware {
            uuid: Some(uuid.to_string()),
            num_cpu_cores: Some(16),
            num_cpu_threads: Some(32),
            num_cpu_pkgs: Some(2),
            cpu_hz: Some(2_400_000_000),
            memory_bytes: Some(256 * 1024 * 1024 * 1024),
            ..Default::default()
        }),
        runtime: Some(HostRuntime {
            connection_state: Some("connected".into()),
            power_state: Some("poweredOn".into()),
            ..Default::default()
        }),
        quick_stats: Some(HostQuickStats {
            overall_cpu_usage_mhz: Some(9_600),
            overall_memory_usage_mb: Some(65_536),
            uptime_secs: Some(86_400),
        }),
        ..Default::default()
    }
}

pub fn vm(name: &str, uuid: &str, host_name: &str) -> NativeVm {
    NativeVm {
        mo_ref: format!("vm-{name}"),
        name: name.to_string(),
        config: Some(VmConfig {
            name: Some(name.to_string()),
            uuid: Some(uuid.to_string()),
            guest_id: Some("ubuntu64Guest".into()),
            num_cpu: Some(4),
            memory_mb: Some(8192),
            devices: vec![NativeDevice::Disk(NativeDisk {
                key: 2000,
                label: "Hard disk 1".into(),
                capacity_kb: Some(40 * 1024 * 1024),
                file_name: Some(format!("[ds01] {name}/{name}.vmdk")),
                ..Default::default()
            })],
            ..Default::default()
        }),
        runtime: Some(VmRuntime {
            power_state: Some("poweredOn".into()),
            host: Some(NativeHostRef {
                name: host_name.to_string(),
                parent: None,
            }),
            max_cpu_usage_mhz: Some(9_600),
            ..Default::default()
        }),
        quick_stats: Some(VmQuickStats {
            overall_cpu_usage_mhz: Some(960),
            guest_memory_usage_mb: Some(2048),
        }),
        ..Default::default()
    }
}

pub fn template(name: &str, uuid: &str) -> NativeVm {
    let mut t = vm(name, uuid, "");
    if let Some(config) = t.config.as_mut() {
        config.template = true;
    }
    t.runtime = None;
    t
}

pub fn snapshot(id: i64, name: &str, children: Vec<NativeSnapshot>) -> NativeSnapshot {
    NativeSnapshot {
        id,
        name: name.to_string(),
        children,
        ..Default::default()
    }
}

pub fn with_snapshots(mut vm: NativeVm, current: i64, roots: Vec<NativeSnapshot>) -> NativeVm {
    vm.snapshot = Some(SnapshotInfo {
        current_snapshot: Some(current),
        root_snapshots: roots,
    });
    vm
}

pub fn datastore(name: &str, hosts: &[&str]) -> NativeDatastore {
    NativeDatastore {
        mo_ref: format!("datastore-{name}"),
        name: name.to_string(),
        summary: Some(DatastoreSummary {
            fs_type: Some("VMFS".into()),
            capacity_bytes: Some(2 * 1024 * 1024 * 1024 * 1024),
            free_bytes: Some(1024 * 1024 * 1024 * 1024),
            accessible: Some(true),
            ..Default::default()
        }),
        host_mounts: hosts.iter().map(|h| h.to_string()).collect(),
        ..Default::default()
    }
}

/// Two hosts, two VMs, a template and a shared datastore.
pub fn sample_inventory() -> Inventory {
    Inventory {
        about: AboutInfo {
            name: "VMware vCenter Server".into(),
            version: "8.0.2".into(),
            build: "22617221".into(),
            api_type: "VirtualCenter".into(),
            ..Default::default()
        },
        datacenters: vec![NativeDatacenter {
            mo_ref: "datacenter-1".into(),
            name: "DC1".into(),
        }],
        hosts: vec![
            host("esx01.lab", "host-uuid-1"),
            host("esx02.lab", "host-uuid-2"),
        ],
        vms: vec![
            vm("web01", "vm-uuid-1", "esx01.lab"),
            vm("db01", "vm-uuid-2", "esx02.lab"),
            template("tpl-ubuntu", "tpl-uuid-1"),
        ],
        datastores: vec![datastore("ds01", &["esx01.lab", "esx02.lab"])],
        ..Default::default()
    }
}
