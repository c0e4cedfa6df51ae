//! Connector and session seams.
//!
//! An [`InventoryConnector`] opens an authenticated [`InventorySession`]
//! against one platform endpoint. Sessions are short-lived: callers open one
//! per unit of work through [`with_session`], which closes it on every exit
//! path.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use virtsync_core::native::{
    AboutInfo, NativeCluster, NativeDatacenter, NativeDatastore, NativeHost, NativeNetwork,
    NativeVm,
};
use virtsync_core::status::PlatformType;
use virtsync_core::types::DbId;

use crate::error::InventoryError;

/// Default per-request timeout against an inventory endpoint.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to open a session against one platform.
#[derive(Clone)]
pub struct ConnectParams {
    pub platform_id: DbId,
    pub platform_type: PlatformType,
    pub address: String,
    pub port: u16,
    pub username: String,
    /// Plaintext secret, already resolved from the credential store.
    pub secret: String,
    pub verify_tls: bool,
    pub timeout: Duration,
}

impl ConnectParams {
    /// Base URL of the endpoint, e.g. `https://vc01.lab:443`.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.address, self.port)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("platform_id", &self.platform_id)
            .field("platform_type", &self.platform_type)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Opens sessions against platform endpoints.
#[async_trait]
pub trait InventoryConnector: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn InventorySession>, InventoryError>;
}

/// An authenticated session. Enumerations return platform-native records.
#[async_trait]
pub trait InventorySession: Send + Sync {
    async fn about(&self) -> Result<AboutInfo, InventoryError>;

    async fn list_datacenters(&self) -> Result<Vec<NativeDatacenter>, InventoryError>;

    async fn list_clusters(&self) -> Result<Vec<NativeCluster>, InventoryError>;

    async fn list_hosts(&self) -> Result<Vec<NativeHost>, InventoryError>;

    /// All VMs, templates included.
    async fn list_vms(&self) -> Result<Vec<NativeVm>, InventoryError>;

    async fn list_templates(&self) -> Result<Vec<NativeVm>, InventoryError> {
        let vms = self.list_vms().await?;
        Ok(vms.into_iter().filter(NativeVm::is_template).collect())
    }

    async fn list_datastores(&self) -> Result<Vec<NativeDatastore>, InventoryError>;

    async fn list_networks(&self) -> Result<Vec<NativeNetwork>, InventoryError>;

    /// Close the session. Calling this more than once is a no-op.
    async fn disconnect(&self) -> Result<(), InventoryError>;
}

/// Open a session, run `f` with it, and close the session afterwards.
///
/// The session is closed whether `f` returns `Ok`, returns `Err`, or panics
/// (the panic is re-raised after closing). If the returned future is dropped
/// before completion the close is spawned onto the current runtime.
pub async fn with_session<T, E, F, Fut>(
    connector: &dyn InventoryConnector,
    params: &ConnectParams,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(Arc<dyn InventorySession>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<InventoryError>,
{
    let session: Arc<dyn InventorySession> = Arc::from(connector.connect(params).await?);
    let mut guard = DisconnectGuard {
        session: Some(Arc::clone(&session)),
        platform_id: params.platform_id,
    };

    let outcome = AssertUnwindSafe(f(Arc::clone(&session)))
        .catch_unwind()
        .await;

    guard.disarm();
    if let Err(e) = session.disconnect().await {
        tracing::warn!(
            platform_id = params.platform_id,
            error = %e,
            "Failed to close inventory session",
        );
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Closes the session on drop unless disarmed.
struct DisconnectGuard {
    session: Option<Arc<dyn InventorySession>>,
    platform_id: DbId,
}

impl DisconnectGuard {
    fn disarm(&mut self) {
        self.session = None;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let platform_id = self.platform_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.disconnect().await {
                        tracing::warn!(
                            platform_id,
                            error = %e,
                            "Failed to close abandoned inventory session",
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(platform_id, "No runtime to close abandoned inventory session");
            }
        }
    }
}
