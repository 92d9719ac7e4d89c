//! Error types for the launch harness
//!
//! Messages carry the raw process output or selector that failed so a CI log
//! is enough to tell which stage of the launch broke.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Process Errors ===
    #[error("Failed to spawn '{command}': {error}")]
    ProcessSpawn { command: String, error: String },

    #[error("'{command}' reported a failure: {output}")]
    ProcessFailed { command: String, output: String },

    #[error("'{command}' exited before reporting readiness (exit code {code:?})")]
    ProcessExited { command: String, code: Option<i32> },

    #[error("'{command}' exited without the expected output; first output was: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("'{command}' produced output that could not be parsed ({error}): {output}")]
    MalformedOutput {
        command: String,
        error: String,
        output: String,
    },

    // === App Errors ===
    #[error("Timed out after {timeout:?} waiting for '{selector}'")]
    ReadinessTimeout { selector: String, timeout: Duration },

    #[error("Automation error: {0}")]
    Automation(String),

    #[error("Cannot {action} while app is {state}")]
    InvalidState { action: String, state: String },

    #[error("App has not been launched yet")]
    NotLaunched,

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a process failure error from marker text
    pub fn process_failed(command: &str, output: &str) -> Self {
        Self::ProcessFailed {
            command: command.to_string(),
            output: output.to_string(),
        }
    }

    /// Create a malformed output error
    pub fn malformed_output(command: &str, output: &str, error: impl ToString) -> Self {
        Self::MalformedOutput {
            command: command.to_string(),
            error: error.to_string(),
            output: output.to_string(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: impl ToString) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Whether this error came from an external process rather than the GUI
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Error::ProcessSpawn { .. }
                | Error::ProcessFailed { .. }
                | Error::ProcessExited { .. }
                | Error::UnexpectedOutput { .. }
                | Error::MalformedOutput { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failure_classification() {
        assert!(Error::process_failed("gaiad start", "Error: bad state").is_process_failure());
        assert!(Error::ProcessExited {
            command: "gaiad init".to_string(),
            code: Some(1)
        }
        .is_process_failure());
        assert!(!Error::ReadinessTimeout {
            selector: ".tm-session".to_string(),
            timeout: Duration::from_secs(10)
        }
        .is_process_failure());
    }

    #[test]
    fn test_messages_include_raw_output() {
        let err = Error::process_failed("gaiad start", "Error: bad state");
        assert!(err.to_string().contains("Error: bad state"));

        let err = Error::invalid_state("start", "running");
        assert_eq!(err.to_string(), "Cannot start while app is running");

        let err = Error::ReadinessTimeout {
            selector: ".tm-session".to_string(),
            timeout: Duration::from_millis(200),
        };
        assert_eq!(err.to_string(), "Timed out after 200ms waiting for '.tm-session'");
    }
}
