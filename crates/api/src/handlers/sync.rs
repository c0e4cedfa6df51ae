//! Handlers for the `/sync` resource.
//!
//! Triggers answer `202 Accepted` with the id of the dispatched job; the
//! outcome is read back through `GET /sync/tasks/{task_id}`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use virtsync_core::error::CoreError;
use virtsync_core::types::DbId;
use virtsync_pipeline::{JobStatus, SyncType};

use crate::error::{AppError, AppResult};
use crate::middleware::operator::Operator;
use crate::response::{accepted, ok, DataResponse};
use crate::state::AppState;

/// Optional body of a platform trigger. An empty body means a full sync.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerSync {
    #[serde(default)]
    pub sync_type: Option<String>,
}

impl TriggerSync {
    fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
    }

    fn sync_type(&self) -> AppResult<SyncType> {
        match self.sync_type.as_deref() {
            None => Ok(SyncType::All),
            Some(raw) => Ok(raw.parse()?),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepAccepted {
    pub task_id: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InitialSync {
    pub platform_id: DbId,
    /// `None` when the platform is inactive or has no credential.
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Cancelled {
    pub task_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct ThrottlesCleared {
    pub cleared: u64,
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// POST /api/v1/sync/platforms/{id}
///
/// Body (optional): `{ "sync_type": "all" | "platform" | "hosts" | "vms" |
/// "datastores" | "templates" }`. Returns 202 with the dispatched task id,
/// 404 for unknown or inactive platforms, 429 while throttled.
pub async fn trigger_platform_sync(
    operator: Operator,
    State(state): State<AppState>,
    Path(platform_id): Path<DbId>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let sync_type = TriggerSync::from_body(&body)?.sync_type()?;
    let triggered = state.sync.trigger(platform_id, sync_type, &operator.0).await?;

    Ok(accepted(triggered))
}

/// POST /api/v1/sync/all
///
/// Dispatch a full sync of every active platform. Not throttled.
pub async fn trigger_all_sync(
    operator: Operator,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let task_id = state.sync.trigger_all(&operator.0).await?;

    Ok(accepted(SweepAccepted {
        task_id,
        message: "Sync of all platforms started",
    }))
}

/// POST /api/v1/sync/platforms/{id}/initial
///
/// Called after a platform is registered. Dispatches a full sync when the
/// platform is active and has a credential.
pub async fn initial_platform_sync(
    State(state): State<AppState>,
    Path(platform_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task_id = state.sync.platform_created(platform_id).await?;
    let status = if task_id.is_some() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        ok(InitialSync {
            platform_id,
            task_id,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Task status
// ---------------------------------------------------------------------------

/// GET /api/v1/sync/tasks/{task_id}
///
/// Ids nobody knows are reported as pending.
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<JobStatus>>> {
    let status = state
        .sync
        .job_status(&task_id)
        .await
        .unwrap_or_else(|| JobStatus::unknown(&task_id));

    Ok(ok(status))
}

/// POST /api/v1/sync/tasks/{task_id}/cancel
///
/// The sync stops at its next step boundary. 409 if the task is not
/// running.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<Cancelled>>> {
    if !state.sync.cancel(&task_id).await {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Task {task_id} is not running"
        ))));
    }

    tracing::info!(task_id = %task_id, "Sync cancellation requested");
    Ok(ok(Cancelled {
        task_id,
        cancelled: true,
    }))
}

/// DELETE /api/v1/sync/throttles
///
/// Lifts the trigger throttle on every platform.
pub async fn clear_throttles(
    operator: Operator,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ThrottlesCleared>>> {
    let cleared = state.sync.clear_throttles().await;
    tracing::info!(operator = %operator.0, cleared, "Sync throttles cleared");
    Ok(ok(ThrottlesCleared { cleared }))
}
