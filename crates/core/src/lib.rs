//! Domain types and pure logic for virtualization inventory sync.
//!
//! Nothing in this crate performs I/O. The remote client, the store and the
//! orchestration layer all build on the types defined here:
//!
//! - [`native`]: platform-native inventory records as the control plane
//!   reports them.
//! - [`records`]: canonical flat records persisted by the reconciler.
//! - [`normalize`]: the native → canonical conversion.
//! - [`report`]: per-step and aggregate sync outcomes.
//! - [`task_state`]: OperationTask transition rules.
//! - [`status`]: status and classification enums shared by every layer.

pub mod error;
pub mod native;
pub mod normalize;
pub mod records;
pub mod report;
pub mod status;
pub mod task_state;
pub mod types;
