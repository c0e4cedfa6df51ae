/// Request-level failures raised outside the sync pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The caller sent something malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The target exists but is in the wrong state for the request.
    #[error("Conflict: {0}")]
    Conflict(String),
}
