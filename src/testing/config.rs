//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::{Error, Result};

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// The sequence of test steps to execute against the launched app
    pub steps: Vec<TestStep>,
}

impl TestScenario {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read test scenario '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }
}

/// A single test step in the execution flow
///
/// Steps that take a `selector` fall back to the configured session marker.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Wait until an element exists
    WaitFor {
        selector: String,
        /// Timeout in seconds (default: the app wait timeout)
        timeout: Option<u64>,
    },
    /// Stop and start the app
    Restart { selector: Option<String> },
    /// Reload the app view
    Refresh { selector: Option<String> },
    /// Write a local storage entry
    SetLocalStorage { key: String, value: String },
    /// Check a local storage entry; `equals: null` expects it to be unset
    ExpectLocalStorage { key: String, equals: Option<String> },
    /// Save a screenshot, relative to the artifact directory
    Screenshot { path: PathBuf },
}
