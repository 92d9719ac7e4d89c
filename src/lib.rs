//! Voyager e2e launch harness
//!
//! Brings up a disposable local blockchain node, provisions test accounts in
//! a fresh keystore and starts the Voyager GUI under automation, then hands
//! the running environment to tests. Failures anywhere in that chain are
//! handled once: logs and a screenshot are saved and the run ends.

pub mod accounts;
pub mod app;
pub mod cli;
pub mod commands;
pub mod common;
pub mod crash;
pub mod node;
pub mod orchestrator;
pub mod process;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Environment, Error, Result, RunFlags};
pub use crash::{CrashOutcome, CrashRecovery, ExitHook};
pub use orchestrator::{LaunchState, Orchestrator};
