//! Common utilities shared by every stage of the harness

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Flags read from the environment each time they matter
///
/// `CI` and `COSMOS_E2E_KEEP_OPEN` are consulted at crash and stop time rather
/// than at startup, so a test can flip them mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunFlags {
    /// Running under continuous integration: persist logs instead of printing
    pub ci: bool,
    /// Leave the app open after a crash for manual inspection
    pub keep_open: bool,
}

/// Where [`RunFlags`] come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Read the real process environment on every call
    Process,
    /// Fixed flags, for tests and embedding
    Fixed(RunFlags),
}

impl Environment {
    pub fn flags(&self) -> RunFlags {
        match self {
            Environment::Process => RunFlags {
                ci: env_flag("CI"),
                keep_open: env_flag("COSMOS_E2E_KEEP_OPEN"),
            },
            Environment::Fixed(flags) => *flags,
        }
    }
}

/// A variable counts as set when present and non-empty
fn env_flag(name: &str) -> bool {
    std::env::var_os(name).map(|v| !v.is_empty()).unwrap_or(false)
}
