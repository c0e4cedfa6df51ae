//! Background sync worker.
//!
//! Runs the periodic full-sync and metrics sweeps and the metrics retention
//! cleanup until SIGINT or SIGTERM.

mod retention;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virtsync_db::locks::PgLockStore;
use virtsync_db::pg::PgStore;
use virtsync_events::{EventBus, NotificationRouter, WebhookDelivery};
use virtsync_inventory::{Inventory, InventoryConnector, StaticConnector, VSphereRestConnector};
use virtsync_pipeline::{
    LocalDispatcher, Scheduler, SyncConfig, SyncContext, SyncService, ThrottleGuard,
};

/// How long shutdown waits for running sync jobs.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "virtsync_worker=debug,virtsync_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let sync_config = SyncConfig::from_env();
    let retention_hours = retention::retention_hours_from_env();
    tracing::info!(?sync_config, retention_hours, "Loaded worker configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = virtsync_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    virtsync_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    virtsync_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let store = Arc::new(PgStore::new(pool.clone()));
    let locks = Arc::new(PgLockStore::new(pool));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let webhook = std::env::var("NOTIFY_WEBHOOK_URL").ok().map(WebhookDelivery::new);
    let router_handle = tokio::spawn(NotificationRouter::new(webhook).run(event_bus.subscribe()));

    // --- Sync service ---
    let dispatcher = Arc::new(
        LocalDispatcher::new(sync_config.max_concurrent_jobs).with_store(store.clone()),
    );
    let throttle = ThrottleGuard::new(locks, sync_config.throttle_ttl);
    let connector = inventory_connector();
    let ctx = SyncContext::new(store.clone(), connector, event_bus.clone(), sync_config);
    let service = SyncService::new(ctx, throttle, Arc::clone(&dispatcher));

    // --- Background loops ---
    let cancel = CancellationToken::new();

    let scheduler = Scheduler::new(service);
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    let retention_handle = tokio::spawn(retention::run(store, retention_hours, cancel.clone()));

    tracing::info!("Worker started");
    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Background loops stopped");

    if !dispatcher.shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Exiting with sync jobs still running");
    }

    drop(dispatcher);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), router_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// `INVENTORY_FIXTURE` points at a JSON inventory served in place of a live
/// control plane.
fn inventory_connector() -> Arc<dyn InventoryConnector> {
    match std::env::var("INVENTORY_FIXTURE") {
        Ok(path) => {
            let inventory =
                Inventory::from_file(Path::new(&path)).expect("Failed to load inventory fixture");
            tracing::warn!(%path, "Serving inventory from fixture file");
            Arc::new(StaticConnector::new(inventory))
        }
        Err(_) => Arc::new(VSphereRestConnector::new()),
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
