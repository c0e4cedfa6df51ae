use std::sync::Arc;

use virtsync_db::SyncStore;
use virtsync_events::EventSink;
use virtsync_inventory::InventoryConnector;

use crate::config::SyncConfig;
use crate::credentials::{PlaintextSecrets, SecretResolver};
use crate::retry::RetryPolicy;
use crate::tracker::TaskTracker;

/// Shared dependencies of every sync operation.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn SyncStore>,
    pub connector: Arc<dyn InventoryConnector>,
    pub events: Arc<dyn EventSink>,
    pub secrets: Arc<dyn SecretResolver>,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn SyncStore>,
        connector: Arc<dyn InventoryConnector>,
        events: Arc<dyn EventSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            connector,
            events,
            secrets: Arc::new(PlaintextSecrets),
            config,
        }
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn tracker(&self) -> TaskTracker {
        TaskTracker::new(Arc::clone(&self.store))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }
}
