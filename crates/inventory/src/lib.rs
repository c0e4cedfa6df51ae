//! Remote inventory access.
//!
//! [`InventoryConnector`] opens authenticated sessions against a platform
//! endpoint; [`InventorySession`] enumerates its inventory as platform-native
//! records. [`VSphereRestConnector`] talks to vCenter over HTTPS and
//! [`StaticConnector`] serves a fixed inventory in-process.

pub mod error;
pub mod fixture;
pub mod rest;
pub mod session;

pub use error::InventoryError;
pub use fixture::{Call, Inventory, StaticConnector};
pub use rest::VSphereRestConnector;
pub use session::{
    with_session, ConnectParams, InventoryConnector, InventorySession, DEFAULT_REQUEST_TIMEOUT,
};
