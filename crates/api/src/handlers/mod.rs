//! Request handlers. Each submodule delegates to the sync pipeline and maps
//! errors via [`AppError`](crate::error::AppError).

pub mod sync;
