//! OperationTask lifecycle on top of the store.
//!
//! Updates are addressed by correlation id. Tracking is best-effort: a
//! missing task, a rejected transition or a store failure is logged and the
//! caller carries on.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use virtsync_core::status::OperationStatus;
use virtsync_core::task_state::{TaskState, TaskUpdate};
use virtsync_db::models::operation::{CreateOperationTask, OperationTask};
use virtsync_db::{StoreResult, SyncStore};

#[derive(Clone)]
pub struct TaskTracker {
    store: Arc<dyn SyncStore>,
}

impl TaskTracker {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: &CreateOperationTask) -> StoreResult<OperationTask> {
        let task = self.store.create_task(input).await?;
        tracing::debug!(
            correlation_id = %task.correlation_id,
            task_type = %task.task_type,
            "Operation task created",
        );
        Ok(task)
    }

    /// Apply `update` to the task. Returns the new state, or `None` when the
    /// update was ignored.
    pub async fn update(&self, correlation_id: &str, update: TaskUpdate) -> Option<TaskState> {
        let task = match self.store.find_task(correlation_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!(correlation_id, "Operation task not found, update ignored");
                return None;
            }
            Err(e) => {
                tracing::error!(correlation_id, error = %e, "Failed to load operation task");
                return None;
            }
        };

        let current = task.status();
        let next = match task.state().apply(update, Utc::now()) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(correlation_id, error = %e, "Operation task update ignored");
                return None;
            }
        };

        match self.store.save_task_state(correlation_id, current, &next).await {
            Ok(true) => Some(next),
            Ok(false) => {
                tracing::warn!(
                    correlation_id,
                    status = %current,
                    "Operation task changed concurrently, update ignored",
                );
                None
            }
            Err(e) => {
                tracing::error!(correlation_id, error = %e, "Failed to save operation task");
                None
            }
        }
    }

    pub async fn start(&self, correlation_id: &str, step: &str) -> Option<TaskState> {
        self.update(
            correlation_id,
            TaskUpdate::status(OperationStatus::Running).with_step(step),
        )
        .await
    }

    pub async fn progress(
        &self,
        correlation_id: &str,
        progress: i16,
        step: &str,
    ) -> Option<TaskState> {
        self.update(correlation_id, TaskUpdate::progress(progress, step))
            .await
    }

    pub async fn succeed(&self, correlation_id: &str, result: Value) -> Option<TaskState> {
        self.update(
            correlation_id,
            TaskUpdate::status(OperationStatus::Success).with_result(result),
        )
        .await
    }

    pub async fn fail(&self, correlation_id: &str, error: &str) -> Option<TaskState> {
        self.update(
            correlation_id,
            TaskUpdate::status(OperationStatus::Failed).with_error(error),
        )
        .await
    }

    /// Request cancellation. The running job notices at its next step
    /// boundary.
    pub async fn cancel(&self, correlation_id: &str) -> bool {
        self.update(correlation_id, TaskUpdate::status(OperationStatus::Cancelled))
            .await
            .is_some()
    }

    pub async fn is_cancelled(&self, correlation_id: &str) -> bool {
        matches!(
            self.store.find_task(correlation_id).await,
            Ok(Some(task)) if task.status() == OperationStatus::Cancelled
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use virtsync_core::status::TaskType;
    use virtsync_db::memory::MemoryStore;
    use virtsync_db::OperationStore;

    use super::*;

    fn input(cid: &str) -> CreateOperationTask {
        CreateOperationTask {
            correlation_id: cid.to_string(),
            task_type: TaskType::SyncHosts,
            name: "Sync hosts".into(),
            platform_id: Some(1),
            parameters: None,
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn full_lifecycle_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let tracker = TaskTracker::new(store.clone());
        tracker.create(&input("c-1")).await.unwrap();

        tracker.start("c-1", "hosts").await.unwrap();
        tracker.progress("c-1", 50, "hosts").await.unwrap();
        let done = tracker.succeed("c-1", json!({"synced_count": 3})).await.unwrap();

        assert_eq!(done.status, OperationStatus::Success);
        assert_eq!(done.progress, 100);
        let task = store.tasks().await.remove(0);
        assert_eq!(task.status(), OperationStatus::Success);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
        assert_eq!(task.result, Some(json!({"synced_count": 3})));
    }

    #[tokio::test]
    async fn unknown_correlation_id_is_ignored() {
        let tracker = TaskTracker::new(Arc::new(MemoryStore::new()));
        assert!(tracker.start("missing", "hosts").await.is_none());
    }

    #[tokio::test]
    async fn terminal_task_is_immutable() {
        let store = Arc::new(MemoryStore::new());
        let tracker = TaskTracker::new(store.clone());
        tracker.create(&input("c-2")).await.unwrap();
        tracker.start("c-2", "vms").await.unwrap();
        tracker.fail("c-2", "boom").await.unwrap();

        assert!(tracker.succeed("c-2", json!({})).await.is_none());
        let task = store.tasks().await.remove(0);
        assert_eq!(task.status(), OperationStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn stale_update_does_not_overwrite_a_cancel() {
        let store = Arc::new(MemoryStore::new());
        let tracker = TaskTracker::new(store.clone());
        tracker.create(&input("c-4")).await.unwrap();
        tracker.start("c-4", "templates").await.unwrap();

        // The runner computed its success from a read taken before the cancel.
        let stale = store.find_task("c-4").await.unwrap().unwrap();
        let success = stale
            .state()
            .apply(TaskUpdate::status(OperationStatus::Success), Utc::now())
            .unwrap();
        assert!(tracker.cancel("c-4").await);

        let saved = store
            .save_task_state("c-4", stale.status(), &success)
            .await
            .unwrap();
        assert!(!saved);
        let task = store.tasks().await.remove(0);
        assert_eq!(task.status(), OperationStatus::Cancelled);
        assert!(tracker.succeed("c-4", json!({})).await.is_none());
    }

    #[tokio::test]
    async fn cancel_is_visible_to_the_runner() {
        let tracker = TaskTracker::new(Arc::new(MemoryStore::new()));
        tracker.create(&input("c-3")).await.unwrap();
        tracker.start("c-3", "platform_info").await.unwrap();

        assert!(!tracker.is_cancelled("c-3").await);
        assert!(tracker.cancel("c-3").await);
        assert!(tracker.is_cancelled("c-3").await);
        assert!(!tracker.cancel("c-3").await);
    }
}
