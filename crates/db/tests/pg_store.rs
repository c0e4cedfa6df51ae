//! PostgreSQL-backed store checks. Each test gets a fresh database from
//! `#[sqlx::test]`; run with `DATABASE_URL` set and `--ignored`.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use virtsync_core::status::{OperationStatus, TaskType};
use virtsync_core::task_state::{TaskState, TaskUpdate};
use virtsync_db::locks::{LockStore, PgLockStore};
use virtsync_db::models::operation::CreateOperationTask;
use virtsync_db::pg::PgStore;
use virtsync_db::OperationStore;

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn lock_expiry_follows_the_database_clock(pool: PgPool) {
    let locks = PgLockStore::new(pool);

    locks
        .set_with_expiry("sync:platform:1", Duration::from_secs(300))
        .await
        .unwrap();
    let left = locks.remaining("sync:platform:1").await.unwrap().unwrap();
    assert!(left <= Duration::from_secs(300) && left > Duration::from_secs(290));

    locks
        .set_with_expiry("sync:platform:2", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(locks.remaining("sync:platform:2").await.unwrap(), None);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn lock_prefix_delete_escapes_wildcards(pool: PgPool) {
    let locks = PgLockStore::new(pool);
    for key in ["sync:platform:1", "sync:platform:2", "sync_platform:3"] {
        locks
            .set_with_expiry(key, Duration::from_secs(60))
            .await
            .unwrap();
    }

    assert_eq!(locks.delete_prefix("sync:platform:").await.unwrap(), 2);
    assert!(locks.remaining("sync_platform:3").await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Operation tasks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn task_state_write_requires_the_expected_status(pool: PgPool) {
    let store = PgStore::new(pool);
    store
        .create_task(&CreateOperationTask {
            correlation_id: "c-1".into(),
            task_type: TaskType::SyncPlatform,
            name: "Sync platform vc01".into(),
            platform_id: None,
            parameters: None,
            scheduled_at: None,
        })
        .await
        .unwrap();
    let now = Utc::now();
    let running = TaskState::pending()
        .apply(TaskUpdate::status(OperationStatus::Running), now)
        .unwrap();
    let cancelled = running
        .apply(TaskUpdate::status(OperationStatus::Cancelled), now)
        .unwrap();
    let succeeded = running
        .apply(TaskUpdate::status(OperationStatus::Success), now)
        .unwrap();

    assert!(store
        .save_task_state("c-1", OperationStatus::Pending, &running)
        .await
        .unwrap());
    assert!(store
        .save_task_state("c-1", OperationStatus::Running, &cancelled)
        .await
        .unwrap());
    // A runner still holding the running snapshot loses.
    assert!(!store
        .save_task_state("c-1", OperationStatus::Running, &succeeded)
        .await
        .unwrap());

    let task = store.find_task("c-1").await.unwrap().unwrap();
    assert_eq!(task.status(), OperationStatus::Cancelled);
}
