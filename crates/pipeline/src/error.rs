use virtsync_core::report::SyncStep;
use virtsync_core::types::DbId;
use virtsync_db::StoreError;
use virtsync_inventory::InventoryError;

/// Failure of a sync operation.
///
/// Connection errors are retried at step level. Unparseable records and
/// per-record persistence errors are counted and skipped by the step, so
/// only store failures that abort a whole step surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    Connection(#[from] InventoryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Platform {platform_id} not found or inactive")]
    NotFound { platform_id: DbId },

    #[error("Platform {platform_id} has no credential configured")]
    MissingCredential { platform_id: DbId },

    #[error("Platform {platform_id} has unsupported type '{platform_type}'")]
    UnsupportedPlatform {
        platform_id: DbId,
        platform_type: String,
    },

    #[error("Sync throttled, retry in {remaining_secs} seconds")]
    Throttled { remaining_secs: u64 },

    #[error("Step {step} failed: {error}")]
    StepFailed { step: SyncStep, error: String },

    #[error("Invalid sync type '{0}'")]
    InvalidSyncType(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Worth another attempt after the retry delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_connection_level(),
            _ => false,
        }
    }

    /// Errors that abort the whole platform sequence instead of a single
    /// step: the platform vanished mid-sync or the store is gone.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Timeout(_) | Self::Cancelled => true,
            Self::Persistence(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_level_errors_are_retryable() {
        assert!(SyncError::from(InventoryError::Timeout).is_retryable());
        assert!(SyncError::from(InventoryError::Network("reset".into())).is_retryable());
        assert!(!SyncError::from(InventoryError::Decode("bad json".into())).is_retryable());
        assert!(!SyncError::NotFound { platform_id: 1 }.is_retryable());
        assert!(!SyncError::MissingCredential { platform_id: 1 }.is_retryable());
    }

    #[test]
    fn unavailable_store_is_fatal_but_constraint_is_not() {
        assert!(SyncError::from(StoreError::Unavailable("down".into())).is_fatal());
        assert!(!SyncError::from(StoreError::Constraint("dup".into())).is_fatal());
        assert!(SyncError::NotFound { platform_id: 7 }.is_fatal());
        assert!(!SyncError::from(InventoryError::Timeout).is_fatal());
    }

    #[test]
    fn throttled_message_carries_remaining_seconds() {
        let err = SyncError::Throttled { remaining_secs: 42 };
        assert_eq!(err.to_string(), "Sync throttled, retry in 42 seconds");
    }
}
