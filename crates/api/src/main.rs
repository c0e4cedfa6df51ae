use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virtsync_api::config::ServerConfig;
use virtsync_api::router::build_app_router;
use virtsync_api::state::AppState;
use virtsync_db::locks::PgLockStore;
use virtsync_db::pg::PgStore;
use virtsync_events::{EventBus, NotificationRouter, WebhookDelivery};
use virtsync_inventory::{Inventory, InventoryConnector, StaticConnector, VSphereRestConnector};
use virtsync_pipeline::{LocalDispatcher, SyncConfig, SyncContext, SyncService, ThrottleGuard};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "virtsync_api=debug,virtsync_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let sync_config = SyncConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = virtsync_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    virtsync_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    virtsync_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let store = Arc::new(PgStore::new(pool.clone()));
    let locks = Arc::new(PgLockStore::new(pool));

    // --- Inventory connector ---
    let connector = inventory_connector();

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let webhook = std::env::var("NOTIFY_WEBHOOK_URL").ok().map(WebhookDelivery::new);
    let notification_router = NotificationRouter::new(webhook);
    let router_handle = tokio::spawn(notification_router.run(event_bus.subscribe()));
    tracing::info!("Notification router started");

    // --- Sync service ---
    let dispatcher = Arc::new(
        LocalDispatcher::new(sync_config.max_concurrent_jobs).with_store(store.clone()),
    );
    let throttle = ThrottleGuard::new(locks, sync_config.throttle_ttl);
    let ctx = SyncContext::new(store.clone(), connector, event_bus.clone(), sync_config);
    let sync = SyncService::new(ctx, throttle, Arc::clone(&dispatcher));

    // --- App state ---
    let state = AppState {
        store,
        sync,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = config.bind_addr().expect("Invalid HOST address");
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        running = dispatcher.running(),
        "Server stopped accepting connections, draining sync jobs",
    );
    dispatcher
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    // Dropping the last sender closes the channel and stops the router.
    drop(dispatcher);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), router_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// `INVENTORY_FIXTURE` points at a JSON inventory served in place of a live
/// control plane (development and demos).
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

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
