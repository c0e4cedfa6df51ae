//! External delivery channels for sync notifications.

pub mod webhook;
