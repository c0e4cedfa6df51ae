pub mod health;
pub mod sync;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /sync/platforms/{id}                 trigger a platform sync (POST)
/// /sync/platforms/{id}/initial         first sync of a new platform (POST)
/// /sync/all                            sweep every active platform (POST)
/// /sync/tasks/{task_id}                job status (GET)
/// /sync/tasks/{task_id}/cancel         cancel a running sync (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/sync", sync::router())
}
