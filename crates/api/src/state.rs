use std::sync::Arc;

use virtsync_db::SyncStore;
use virtsync_pipeline::SyncService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for health checks and lookups.
    pub store: Arc<dyn SyncStore>,
    /// Sync triggers, sweeps and job status.
    pub sync: SyncService,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
