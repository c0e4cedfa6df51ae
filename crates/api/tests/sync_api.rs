//! End-to-end tests for the `/api/v1/sync` routes.

mod common;

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use common::*;
use serde_json::json;
use virtsync_core::status::OperationStatus;

// ---------------------------------------------------------------------------
// Test: triggering a platform sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_without_body_runs_a_full_sync() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;

    let (status, json) = send(
        &app.router,
        post(&format!("/api/v1/sync/platforms/{}", platform.id)),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let data = &json["data"];
    assert_eq!(data["platform_id"], platform.id);
    assert_eq!(data["platform_name"], "vc01");
    assert_eq!(data["sync_type"], "all");
    let task_id = data["task_id"].as_str().unwrap().to_string();

    let task = wait_ready(&app.router, &task_id).await;
    assert_eq!(task["status"], "SUCCESS");
    assert_eq!(task["successful"], true);
    assert_eq!(app.store.hosts(platform.id).await.len(), 1);

    let log = app.store.logs().await.remove(0);
    assert_eq!(log.operator, "anonymous");
    assert_eq!(log.status(), OperationStatus::Success);
}

#[tokio::test]
async fn trigger_single_entity_type() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;

    let (status, json) = send(
        &app.router,
        post_json(
            &format!("/api/v1/sync/platforms/{}", platform.id),
            json!({ "sync_type": "hosts" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["sync_type"], "hosts");
    let task_id = json["data"]["task_id"].as_str().unwrap().to_string();
    let task = wait_ready(&app.router, &task_id).await;
    assert_eq!(task["status"], "SUCCESS");
    assert_eq!(task["result"]["step"], "hosts");
    assert!(app.store.vms(platform.id).await.is_empty());

    let log = app.store.logs().await.remove(0);
    assert_eq!(log.operator, "alice");
}

#[tokio::test]
async fn invalid_sync_type_is_rejected() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;

    let (status, json) = send(
        &app.router,
        post_json(
            &format!("/api/v1/sync/platforms/{}", platform.id),
            json!({ "sync_type": "networks" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(app.store.logs().await.is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/api/v1/sync/platforms/{}", platform.id))
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_platform_returns_404() {
    let app = build_test_app();

    let (status, json) = send(&app.router, post("/api/v1/sync/platforms/999")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Platform 999 not found or inactive");
}

#[tokio::test]
async fn inactive_platform_returns_404() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;
    app.store.set_platform_active(platform.id, false).await;

    let (status, _) = send(
        &app.router,
        post(&format!("/api/v1/sync/platforms/{}", platform.id)),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeated_trigger_is_throttled() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;
    let uri = format!("/api/v1/sync/platforms/{}", platform.id);

    let (first, json) = send(&app.router, post(&uri)).await;
    assert_eq!(first, StatusCode::ACCEPTED);
    wait_ready(&app.router, json["data"]["task_id"].as_str().unwrap()).await;

    let (status, json) = send(&app.router, post(&uri)).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "THROTTLED");
    let remaining = json["remaining_seconds"].as_u64().unwrap();
    assert!(remaining > 0 && remaining <= 300);
}

// ---------------------------------------------------------------------------
// Test: sweep, initial sync and task endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_is_accepted() {
    let app = build_test_app();
    seed_platform(&app.store, "vc01").await;

    let (status, json) = send(&app.router, post("/api/v1/sync/all")).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = json["data"]["task_id"].as_str().unwrap().to_string();
    let task = wait_ready(&app.router, &task_id).await;
    assert_eq!(task["status"], "SUCCESS");
    assert_eq!(task["result"]["summary"]["total"], 1);
}

#[tokio::test]
async fn initial_sync_of_new_platform() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;

    let (status, json) = send(
        &app.router,
        post(&format!("/api/v1/sync/platforms/{}/initial", platform.id)),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(json["data"]["task_id"].is_string());
}

#[tokio::test]
async fn unknown_task_is_pending() {
    let app = build_test_app();

    let (status, json) = send(&app.router, get("/api/v1/sync/tasks/nope")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["task_id"], "nope");
    assert_eq!(json["data"]["status"], "PENDING");
    assert_eq!(json["data"]["ready"], false);
    assert!(json["data"]["successful"].is_null());
}

#[tokio::test]
async fn cancelling_unknown_task_conflicts() {
    let app = build_test_app();

    let (status, json) = send(&app.router, post("/api/v1/sync/tasks/nope/cancel")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn clearing_throttles_allows_an_immediate_retrigger() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;
    let uri = format!("/api/v1/sync/platforms/{}", platform.id);

    let (_, json) = send(&app.router, post(&uri)).await;
    wait_ready(&app.router, json["data"]["task_id"].as_str().unwrap()).await;

    let clear = Request::builder()
        .method("DELETE")
        .uri("/api/v1/sync/throttles")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app.router, clear).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cleared"], 1);

    let (status, _) = send(&app.router, post(&uri)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn non_ascii_operator_header_is_rejected() {
    let app = build_test_app();
    let platform = seed_platform(&app.store, "vc01").await;
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/sync/platforms/{}", platform.id))
        .header("x-operator", HeaderValue::from_bytes(b"jos\xe9").unwrap())
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}
