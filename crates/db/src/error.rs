use virtsync_core::types::DbId;

/// Failure reported by a [`SyncStore`](crate::store::SyncStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },
}

impl StoreError {
    /// Errors that affect every subsequent call, not just the current record.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
