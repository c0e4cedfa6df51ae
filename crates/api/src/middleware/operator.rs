//! Operator identity for audited actions.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use virtsync_core::error::CoreError;

use crate::error::AppError;

/// Header naming the person or system behind a request.
pub const OPERATOR_HEADER: &str = "x-operator";

/// Recorded when a request does not name its operator.
pub const ANONYMOUS: &str = "anonymous";

/// Who triggered an action, taken from the `X-Operator` header.
///
/// Authentication happens in front of this service; the header is trusted
/// as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(OPERATOR_HEADER) else {
            return Ok(Operator(ANONYMOUS.to_string()));
        };
        let name = value
            .to_str()
            .map_err(|_| CoreError::Validation("X-Operator header must be ASCII".into()))?
            .trim();
        if name.is_empty() {
            return Ok(Operator(ANONYMOUS.to_string()));
        }
        Ok(Operator(name.to_string()))
    }
}
