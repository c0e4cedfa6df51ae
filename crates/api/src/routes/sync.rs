//! Route definitions for the `/sync` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::sync;
use crate::state::AppState;

/// Routes mounted at `/sync`.
///
/// ```text
/// POST   /platforms/{id}            -> trigger_platform_sync
/// POST   /platforms/{id}/initial    -> initial_platform_sync
/// POST   /all                       -> trigger_all_sync
/// GET    /tasks/{task_id}           -> task_status
/// POST   /tasks/{task_id}/cancel    -> cancel_task
/// DELETE /throttles                 -> clear_throttles
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/platforms/{id}", post(sync::trigger_platform_sync))
        .route("/platforms/{id}/initial", post(sync::initial_platform_sync))
        .route("/all", post(sync::trigger_all_sync))
        .route("/tasks/{task_id}", get(sync::task_status))
        .route("/tasks/{task_id}/cancel", post(sync::cancel_task))
        .route("/throttles", delete(sync::clear_throttles))
}
