#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use virtsync_api::config::ServerConfig;
use virtsync_api::router::build_app_router;
use virtsync_api::state::AppState;
use virtsync_core::native::{AboutInfo, HostHardware, NativeHost, NativeVm, VmConfig};
use virtsync_core::status::PlatformType;
use virtsync_db::locks::MemoryLockStore;
use virtsync_db::memory::MemoryStore;
use virtsync_db::models::platform::{CreatePlatform, Platform};
use virtsync_events::RecordingSink;
use virtsync_inventory::{Inventory, StaticConnector};
use virtsync_pipeline::{LocalDispatcher, SyncConfig, SyncContext, SyncService, ThrottleGuard};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub connector: StaticConnector,
}

/// Build the full application router over in-memory stores and a fixture
/// inventory with one host and one VM.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let connector = StaticConnector::new(inventory());
    let sync_config = SyncConfig {
        retry_delay: Duration::ZERO,
        retry_jitter: Duration::ZERO,
        ..SyncConfig::default()
    };

    let dispatcher = Arc::new(LocalDispatcher::new(4).with_store(store.clone()));
    let throttle = ThrottleGuard::new(Arc::new(MemoryLockStore::new()), sync_config.throttle_ttl);
    let ctx = SyncContext::new(
        store.clone(),
        Arc::new(connector.clone()),
        Arc::new(RecordingSink::new()),
        sync_config,
    );
    let config = test_config();
    let state = AppState {
        store: store.clone(),
        sync: SyncService::new(ctx, throttle, dispatcher),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        connector,
    }
}

fn inventory() -> Inventory {
    Inventory {
        about: AboutInfo {
            version: "8.0.2".into(),
            ..Default::default()
        },
        hosts: vec![NativeHost {
            name: "esx01.lab".into(),
            hardware: Some(HostHardware {
                uuid: Some("host-uuid-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        }],
        vms: vec![NativeVm {
            name: "web01".into(),
            config: Some(VmConfig {
                uuid: Some("vm-uuid-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub async fn seed_platform(store: &MemoryStore, name: &str) -> Platform {
    let platform = store
        .insert_platform(CreatePlatform {
            name: name.to_string(),
            platform_type: PlatformType::Vcenter,
            address: format!("{name}.lab"),
            port: None,
            verify_tls: None,
            region: None,
        })
        .await;
    store.insert_credential(platform.id, "svc-sync", "s3cret").await;
    platform
}

/// Send a request through the router and return status and parsed JSON body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-operator", "alice")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Poll the task endpoint until the job is ready.
pub async fn wait_ready(app: &Router, task_id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let (_, json) = send(app, get(&format!("/api/v1/sync/tasks/{task_id}"))).await;
        if json["data"]["ready"] == true {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}
