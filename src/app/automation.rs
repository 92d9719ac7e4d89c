//! Remote automation seam between the driver and the GUI
//!
//! [`AutomationClient`] is what the app driver and crash recovery talk to.
//! The production implementation speaks WebDriver; tests use the in-memory
//! client.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::config::Config;
use crate::common::paths::ArtifactPaths;
use crate::common::Result;

/// A DOM readiness marker
///
/// Written as a CSS selector, optionally followed by `=text` to require an
/// element whose trimmed text content equals `text`
/// (`.tm-session-title=Sign In`). An `=` inside `[...]` or `(...)` belongs to
/// the CSS part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    css: String,
    text: Option<String>,
}

impl Selector {
    pub fn parse(raw: &str) -> Self {
        let mut depth = 0i32;
        let split = raw.char_indices().find(|&(_, c)| {
            match c {
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                _ => {}
            }
            c == '=' && depth == 0
        });

        let (css, text) = match split {
            Some((idx, _)) => (raw[..idx].to_string(), Some(raw[idx + 1..].to_string())),
            None => (raw.to_string(), None),
        };
        Self {
            raw: raw.to_string(),
            css,
            text,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A renderer console message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub level: String,
    pub message: String,
}

/// How to launch the GUI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLaunch {
    /// GUI runtime binary
    pub app_binary: PathBuf,
    /// Arguments for the runtime, entry script first
    pub args: Vec<String>,
    /// Environment for the GUI process
    pub env: BTreeMap<String, String>,
    /// WebDriver server binary
    pub driver_binary: PathBuf,
    /// Time allowed for the driver and session to come up
    pub start_timeout: Duration,
}

impl AppLaunch {
    /// The launch used by the Voyager e2e suite: live node, mocking and
    /// devtools off, homes inside the artifact directory
    pub fn from_config(config: &Config, paths: &ArtifactPaths) -> Self {
        let mut env = BTreeMap::new();
        env.insert("COSMOS_NODE".to_string(), "localhost".to_string());
        env.insert("NODE_ENV".to_string(), "production".to_string());
        env.insert("PREVIEW".to_string(), "true".to_string());
        // open devtools break the automation session
        env.insert("COSMOS_DEVTOOLS".to_string(), "0".to_string());
        env.insert(
            "COSMOS_HOME".to_string(),
            paths.cli_home().display().to_string(),
        );
        env.insert(
            "COSMOS_NETWORK".to_string(),
            paths.node_config_dir().display().to_string(),
        );
        env.insert("COSMOS_MOCKED".to_string(), "false".to_string());
        env.insert(
            "BINARY_PATH".to_string(),
            Config::resolve_binary(&config.binaries.cli)
                .display()
                .to_string(),
        );

        Self {
            app_binary: Config::resolve_binary(&config.binaries.app),
            args: vec![
                config.binaries.app_main.display().to_string(),
                "--disable-gpu".to_string(),
                "--no-sandbox".to_string(),
            ],
            env,
            driver_binary: Config::resolve_binary(&config.binaries.driver),
            start_timeout: Duration::from_secs(config.timeouts.app_start_secs),
        }
    }
}

/// Remote control of one GUI instance
///
/// A client is started and stopped repeatedly over a run; every `start`
/// creates a fresh GUI process and session.
#[async_trait]
pub trait AutomationClient: Send {
    /// Launch the GUI and open an automation session
    async fn start(&mut self, launch: &AppLaunch) -> Result<()>;

    /// Close the session and terminate the GUI
    async fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Whether an element matching `selector` currently exists
    async fn exists(&mut self, selector: &Selector) -> Result<bool>;

    /// Reload the current view without restarting the process
    async fn refresh(&mut self) -> Result<()>;

    /// Main process output since the last call
    async fn main_process_logs(&mut self) -> Result<Vec<String>>;

    /// Renderer console messages since the last call
    async fn renderer_process_logs(&mut self) -> Result<Vec<LogEntry>>;

    /// Whether there is a window to screenshot
    fn has_window(&self) -> bool;

    /// PNG bytes of the current window
    async fn capture_page(&mut self) -> Result<Vec<u8>>;

    async fn set_local_storage(&mut self, key: &str, value: &str) -> Result<()>;

    async fn local_storage(&mut self, key: &str) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_css_selector() {
        let selector = Selector::parse(".tm-session");
        assert_eq!(selector.css(), ".tm-session");
        assert_eq!(selector.text(), None);
    }

    #[test]
    fn test_text_selector() {
        let selector = Selector::parse(".tm-session-title=Sign In");
        assert_eq!(selector.css(), ".tm-session-title");
        assert_eq!(selector.text(), Some("Sign In"));
        assert_eq!(selector.to_string(), ".tm-session-title=Sign In");
    }

    #[test]
    fn test_attribute_equals_stays_css() {
        let selector = Selector::parse("input[name=password]");
        assert_eq!(selector.css(), "input[name=password]");
        assert_eq!(selector.text(), None);

        let selector = Selector::parse("button[type=submit]=Next");
        assert_eq!(selector.css(), "button[type=submit]");
        assert_eq!(selector.text(), Some("Next"));
    }

    #[test]
    fn test_launch_environment() {
        let config = Config::default();
        let paths = ArtifactPaths::new("/tmp/artifacts");
        let launch = AppLaunch::from_config(&config, &paths);

        assert_eq!(launch.env["COSMOS_MOCKED"], "false");
        assert_eq!(launch.env["COSMOS_DEVTOOLS"], "0");
        assert_eq!(launch.env["COSMOS_HOME"], "/tmp/artifacts/cli_home");
        assert_eq!(launch.env["COSMOS_NETWORK"], "/tmp/artifacts/node_home/config");
        assert_eq!(launch.args[1..], ["--disable-gpu", "--no-sandbox"]);
        assert_eq!(launch.start_timeout, Duration::from_secs(10));
    }
}
