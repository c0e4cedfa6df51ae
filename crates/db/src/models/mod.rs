//! Database row models and DTOs.
//!
//! Each submodule contains `FromRow` + `Serialize` entity structs matching
//! the database rows, plus the DTOs the repositories accept for inserts.

pub mod datastore;
pub mod host;
pub mod metrics;
pub mod operation;
pub mod platform;
pub mod template;
pub mod vm;
