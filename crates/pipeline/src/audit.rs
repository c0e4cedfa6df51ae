//! OperationLog entries around operator-triggered actions.
//!
//! An [`AuditScope`] opens a `running` log entry and must be closed with
//! [`AuditScope::succeed`] or [`AuditScope::fail`]. A scope dropped without
//! either (early return, panic, cancelled request) is closed as failed in
//! the background.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use virtsync_core::status::OperationStatus;
use virtsync_core::types::DbId;
use virtsync_db::models::operation::{CreateOperationLog, FinishOperationLog};
use virtsync_db::{StoreResult, SyncStore};

pub struct AuditScope {
    store: Arc<dyn SyncStore>,
    log_id: DbId,
    finished: bool,
}

impl AuditScope {
    pub async fn open(store: Arc<dyn SyncStore>, input: &CreateOperationLog) -> StoreResult<Self> {
        let log = store.create_log(input).await?;
        tracing::debug!(
            log_id = log.id,
            operation_type = %log.operation_type,
            operator = %log.operator,
            "Operation log opened",
        );
        Ok(Self {
            store,
            log_id: log.id,
            finished: false,
        })
    }

    pub async fn succeed(mut self, result: Option<Value>) {
        self.finish(OperationStatus::Success, result, None).await;
    }

    pub async fn fail(mut self, error: &str) {
        self.finish(OperationStatus::Failed, None, Some(error.to_string())).await;
    }

    async fn finish(
        &mut self,
        status: OperationStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        self.finished = true;
        let input = FinishOperationLog {
            status,
            result,
            error_message: error,
            completed_at: Utc::now(),
        };
        if let Err(e) = self.store.finish_log(self.log_id, &input).await {
            tracing::error!(log_id = self.log_id, error = %e, "Failed to close operation log");
        }
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let store = Arc::clone(&self.store);
        let log_id = self.log_id;
        let input = FinishOperationLog {
            status: OperationStatus::Failed,
            result: None,
            error_message: Some("operation abandoned before completion".into()),
            completed_at: Utc::now(),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.finish_log(log_id, &input).await {
                        tracing::error!(
                            log_id,
                            error = %e,
                            "Failed to close abandoned operation log",
                        );
                    }
                });
            }
            Err(_) => tracing::warn!(log_id, "No runtime to close abandoned operation log"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use virtsync_core::status::OperationType;
    use virtsync_db::memory::MemoryStore;

    use super::*;

    fn input() -> CreateOperationLog {
        CreateOperationLog {
            operation_type: OperationType::SyncData,
            operator: "alice".into(),
            target_type: "platform".into(),
            target_id: Some(1),
            target_name: "vc01".into(),
            parameters: Some(json!({ "sync_type": "all" })),
        }
    }

    #[tokio::test]
    async fn success_closes_the_entry() {
        let store = Arc::new(MemoryStore::new());
        let scope = AuditScope::open(store.clone(), &input()).await.unwrap();
        scope.succeed(Some(json!({ "task_id": "abc" }))).await;

        let log = store.logs().await.remove(0);
        assert_eq!(log.status(), OperationStatus::Success);
        assert_eq!(log.result, Some(json!({ "task_id": "abc" })));
        assert!(log.completed_at.is_some());
    }

    #[tokio::test]
    async fn failure_records_the_error() {
        let store = Arc::new(MemoryStore::new());
        let scope = AuditScope::open(store.clone(), &input()).await.unwrap();
        scope.fail("Sync throttled, retry in 12 seconds").await;

        let log = store.logs().await.remove(0);
        assert_eq!(log.status(), OperationStatus::Failed);
        assert!(log.result.is_none());
        assert_eq!(
            log.error_message.as_deref(),
            Some("Sync throttled, retry in 12 seconds")
        );
    }

    #[tokio::test]
    async fn dropped_scope_is_closed_as_failed() {
        let store = Arc::new(MemoryStore::new());
        let scope = AuditScope::open(store.clone(), &input()).await.unwrap();
        drop(scope);

        for _ in 0..100 {
            if store.logs().await[0].completed_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let log = store.logs().await.remove(0);
        assert_eq!(log.status(), OperationStatus::Failed);
        assert_eq!(
            log.error_message.as_deref(),
            Some("operation abandoned before completion")
        );
    }
}
