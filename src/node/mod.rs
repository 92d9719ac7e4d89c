//! Local blockchain node
//!
//! Initializes a single-validator gaiad home, shrinks its consensus timeouts
//! so blocks come quickly, and starts the daemon in the background.

pub mod config_patch;
mod lifecycle;

pub use config_patch::{patch_timeouts, reduce_timeouts};
pub use lifecycle::{AppMessage, InitPayload, NodeLifecycle};
