//! Repository layer: one zero-sized struct per table family, each exposing
//! async functions that take a `&PgPool`.

pub mod datastore_repo;
pub mod host_repo;
pub mod metrics_repo;
pub mod operation_log_repo;
pub mod operation_task_repo;
pub mod platform_repo;
pub mod sync_lock_repo;
pub mod template_repo;
pub mod vm_repo;

pub use datastore_repo::DatastoreRepo;
pub use host_repo::HostRepo;
pub use metrics_repo::MetricsRepo;
pub use operation_log_repo::OperationLogRepo;
pub use operation_task_repo::OperationTaskRepo;
pub use platform_repo::PlatformRepo;
pub use sync_lock_repo::SyncLockRepo;
pub use template_repo::TemplateRepo;
pub use vm_repo::VmRepo;
