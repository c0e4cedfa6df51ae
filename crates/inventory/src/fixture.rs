//! In-process connector serving a fixed inventory.
//!
//! Used by tests and by the `INVENTORY_FIXTURE` development mode of the
//! binaries. Faults and latency can be scripted per enumeration so callers
//! can exercise retry, timeout and partial-failure paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use virtsync_core::native::{
    AboutInfo, NativeCluster, NativeDatacenter, NativeDatastore, NativeHost, NativeNetwork,
    NativeVm,
};

use crate::error::InventoryError;
use crate::session::{ConnectParams, InventoryConnector, InventorySession};

/// A complete platform inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub about: AboutInfo,
    pub datacenters: Vec<NativeDatacenter>,
    pub clusters: Vec<NativeCluster>,
    pub hosts: Vec<NativeHost>,
    pub vms: Vec<NativeVm>,
    pub datastores: Vec<NativeDatastore>,
    pub networks: Vec<NativeNetwork>,
}

impl Inventory {
    /// Load an inventory from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, InventoryError> {
        serde_json::from_str(json).map_err(|e| InventoryError::Decode(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, InventoryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InventoryError::Decode(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}

/// Session call that a fault or delay can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Connect,
    About,
    Datacenters,
    Clusters,
    Hosts,
    Vms,
    Templates,
    Datastores,
    Networks,
}

#[derive(Debug, Clone)]
enum Fault {
    Times(u32, InventoryError),
    Always(InventoryError),
    Panic,
}

#[derive(Default)]
struct Shared {
    inventory: RwLock<Inventory>,
    faults: Mutex<HashMap<Call, Fault>>,
    delays: Mutex<HashMap<Call, Duration>>,
    calls: Mutex<HashMap<Call, usize>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Shared {
    /// Record a call and apply any scripted delay or fault to it.
    async fn enter(&self, call: Call) -> Result<(), InventoryError> {
        *self.calls.lock().await.entry(call).or_default() += 1;

        let delay = self.delays.lock().await.get(&call).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut faults = self.faults.lock().await;
        let fault = match faults.get_mut(&call) {
            None => return Ok(()),
            Some(Fault::Always(e)) => e.clone(),
            Some(Fault::Panic) => panic!("scripted panic in {call:?}"),
            Some(Fault::Times(remaining, e)) => {
                let e = e.clone();
                *remaining -= 1;
                if *remaining == 0 {
                    faults.remove(&call);
                }
                e
            }
        };
        Err(fault)
    }
}

/// Connector that serves a shared, mutable [`Inventory`].
#[derive(Clone, Default)]
pub struct StaticConnector {
    shared: Arc<Shared>,
}

impl StaticConnector {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            shared: Arc::new(Shared {
                inventory: RwLock::new(inventory),
                ..Default::default()
            }),
        }
    }

    /// Replace the served inventory. Open sessions see the change.
    pub async fn set_inventory(&self, inventory: Inventory) {
        *self.shared.inventory.write().await = inventory;
    }

    pub async fn update<F: FnOnce(&mut Inventory)>(&self, f: F) {
        f(&mut *self.shared.inventory.write().await);
    }

    /// Fail the next `times` invocations of `call` with `error`.
    pub async fn fail_times(&self, call: Call, times: u32, error: InventoryError) {
        if times == 0 {
            return;
        }
        self.shared
            .faults
            .lock()
            .await
            .insert(call, Fault::Times(times, error));
    }

    /// Fail every invocation of `call` with `error` until cleared.
    pub async fn fail_always(&self, call: Call, error: InventoryError) {
        self.shared
            .faults
            .lock()
            .await
            .insert(call, Fault::Always(error));
    }

    /// Panic inside `call` on its next invocations until cleared.
    pub async fn panic_on(&self, call: Call) {
        self.shared.faults.lock().await.insert(call, Fault::Panic);
    }

    pub async fn clear_faults(&self) {
        self.shared.faults.lock().await.clear();
    }

    /// Delay every invocation of `call` by `delay`.
    pub async fn delay(&self, call: Call, delay: Duration) {
        self.shared.delays.lock().await.insert(call, delay);
    }

    /// How many times `call` has been invoked.
    pub async fn calls(&self, call: Call) -> usize {
        self.shared
            .calls
            .lock()
            .await
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    /// Sessions successfully opened.
    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Sessions closed (first close of each session only).
    pub fn disconnects(&self) -> usize {
        self.shared.disconnects.load(Ordering::SeqCst)
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.connects().saturating_sub(self.disconnects())
    }
}

#[async_trait]
impl InventoryConnector for StaticConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn InventorySession>, InventoryError> {
        self.shared.enter(Call::Connect).await?;
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(platform_id = params.platform_id, "Opened fixture session");
        Ok(Box::new(StaticSession {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

struct StaticSession {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl StaticSession {
    async fn read<T, F>(&self, call: Call, f: F) -> Result<T, InventoryError>
    where
        F: FnOnce(&Inventory) -> T,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(InventoryError::SessionClosed);
        }
        self.shared.enter(call).await?;
        Ok(f(&*self.shared.inventory.read().await))
    }
}

#[async_trait]
impl InventorySession for StaticSession {
    async fn about(&self) -> Result<AboutInfo, InventoryError> {
        self.read(Call::About, |inv| inv.about.clone()).await
    }

    async fn list_datacenters(&self) -> Result<Vec<NativeDatacenter>, InventoryError> {
        self.read(Call::Datacenters, |inv| inv.datacenters.clone())
            .await
    }

    async fn list_clusters(&self) -> Result<Vec<NativeCluster>, InventoryError> {
        self.read(Call::Clusters, |inv| inv.clusters.clone()).await
    }

    async fn list_hosts(&self) -> Result<Vec<NativeHost>, InventoryError> {
        self.read(Call::Hosts, |inv| inv.hosts.clone()).await
    }

    async fn list_vms(&self) -> Result<Vec<NativeVm>, InventoryError> {
        self.read(Call::Vms, |inv| inv.vms.clone()).await
    }

    async fn list_templates(&self) -> Result<Vec<NativeVm>, InventoryError> {
        self.read(Call::Templates, |inv| {
            inv.vms.iter().filter(|vm| vm.is_template()).cloned().collect()
        })
        .await
    }

    async fn list_datastores(&self) -> Result<Vec<NativeDatastore>, InventoryError> {
        self.read(Call::Datastores, |inv| inv.datastores.clone())
            .await
    }

    async fn list_networks(&self) -> Result<Vec<NativeNetwork>, InventoryError> {
        self.read(Call::Networks, |inv| inv.networks.clone()).await
    }

    async fn disconnect(&self) -> Result<(), InventoryError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use virtsync_core::native::VmConfig;
    use virtsync_core::status::PlatformType;

    use super::*;
    use crate::session::{with_session, DEFAULT_REQUEST_TIMEOUT};

    fn params() -> ConnectParams {
        ConnectParams {
            platform_id: 1,
            platform_type: PlatformType::Vcenter,
            address: "vc01.lab".into(),
            port: 443,
            username: "svc".into(),
            secret: "s3cret".into(),
            verify_tls: false,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    fn vm(name: &str, template: bool) -> NativeVm {
        NativeVm {
            name: name.into(),
            config: Some(VmConfig {
                uuid: Some(format!("uuid-{name}")),
                template,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn inventory() -> Inventory {
        Inventory {
            vms: vec![vm("web01", false), vm("tpl-ubuntu", true)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn templates_are_filtered_from_vms() {
        let connector = StaticConnector::new(inventory());
        let session = connector.connect(&params()).await.unwrap();

        let templates = session.list_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "tpl-ubuntu");
        assert_eq!(session.list_vms().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scripted_faults_expire_after_count() {
        let connector = StaticConnector::new(inventory());
        connector
            .fail_times(Call::Vms, 2, InventoryError::Network("reset".into()))
            .await;
        let session = connector.connect(&params()).await.unwrap();

        assert_matches!(session.list_vms().await, Err(InventoryError::Network(_)));
        assert_matches!(session.list_vms().await, Err(InventoryError::Network(_)));
        assert!(session.list_vms().await.is_ok());
        assert_eq!(connector.calls(Call::Vms).await, 3);
    }

    #[tokio::test]
    async fn closed_session_rejects_calls_and_close_is_idempotent() {
        let connector = StaticConnector::new(inventory());
        let session = connector.connect(&params()).await.unwrap();

        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();

        assert_eq!(connector.disconnects(), 1);
        assert_matches!(session.list_hosts().await, Err(InventoryError::SessionClosed));
    }

    #[tokio::test]
    async fn with_session_closes_on_success_and_error() {
        let connector = StaticConnector::new(inventory());

        let count = with_session(&connector, &params(), |s| async move {
            Ok::<_, InventoryError>(s.list_vms().await?.len())
        })
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(connector.open_sessions(), 0);

        connector
            .fail_always(Call::Hosts, InventoryError::Timeout)
            .await;
        let result = with_session(&connector, &params(), |s| async move {
            s.list_hosts().await
        })
        .await;
        assert_matches!(result, Err(InventoryError::Timeout));
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn with_session_closes_on_panic() {
        let connector = StaticConnector::new(inventory());
        connector.panic_on(Call::Datastores).await;

        let c = connector.clone();
        let joined = tokio::spawn(async move {
            with_session(&c, &params(), |s| async move { s.list_datastores().await }).await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.disconnects(), 1);
    }

    #[tokio::test]
    async fn failed_connect_opens_nothing() {
        let connector = StaticConnector::new(inventory());
        connector
            .fail_times(Call::Connect, 1, InventoryError::Auth("bad password".into()))
            .await;

        let result = with_session(&connector, &params(), |s| async move { s.about().await }).await;
        assert_matches!(result, Err(InventoryError::Auth(_)));
        assert_eq!(connector.connects(), 0);
        assert_eq!(connector.disconnects(), 0);
    }

    #[test]
    fn inventory_loads_from_json() {
        let inv = Inventory::from_json(
            r#"{
                "about": {"version": "8.0.2", "build": "22617221"},
                "hosts": [{"name": "esx01", "hardware": {"uuid": "h-1"}}],
                "vms": [{"name": "web01", "config": {"uuid": "v-1", "devices": [
                    {"kind": "disk", "key": 2000, "label": "Hard disk 1", "capacity_kb": 41943040}
                ]}}]
            }"#,
        )
        .unwrap();
        assert_eq!(inv.about.version, "8.0.2");
        assert_eq!(inv.hosts[0].hardware.as_ref().unwrap().uuid.as_deref(), Some("h-1"));
        assert_eq!(inv.vms[0].config.as_ref().unwrap().devices.len(), 1);
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let rendered = format!("{:?}", params());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
