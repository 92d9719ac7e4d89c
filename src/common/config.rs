//! Configuration file handling
//!
//! Every section has serde defaults so an empty or missing file yields the
//! layout the Voyager e2e suite has always used. Binary paths can be
//! overridden from the environment after the file is loaded.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// External binaries driven by the harness
    #[serde(default)]
    pub binaries: Binaries,

    /// Artifact directory settings
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Readiness classification
    #[serde(default)]
    pub readiness: Readiness,

    /// Node config patching
    #[serde(default)]
    pub patch: TimeoutPatch,

    /// Test account settings
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// DOM readiness markers
    #[serde(default)]
    pub selectors: Selectors,
}

/// Paths to the processes making up the stack
#[derive(Debug, Deserialize, Clone)]
pub struct Binaries {
    /// Blockchain daemon (`gaiad`)
    #[serde(default = "default_node_binary")]
    pub node: PathBuf,

    /// Wallet CLI (`gaiacli`)
    #[serde(default = "default_cli_binary")]
    pub cli: PathBuf,

    /// GUI runtime (electron)
    #[serde(default = "default_app_binary")]
    pub app: PathBuf,

    /// Entry script handed to the GUI runtime
    #[serde(default = "default_app_main")]
    pub app_main: PathBuf,

    /// WebDriver server (chromedriver)
    #[serde(default = "default_driver_binary")]
    pub driver: PathBuf,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            node: default_node_binary(),
            cli: default_cli_binary(),
            app: default_app_binary(),
            app_main: default_app_main(),
            driver: default_driver_binary(),
        }
    }
}

/// Platform folder the Gaia builds are published under
pub fn os_folder_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows_amd64"
    } else if cfg!(target_os = "macos") {
        "darwin_amd64"
    } else {
        "linux_amd64"
    }
}

fn default_node_binary() -> PathBuf {
    Path::new("builds/Gaia").join(os_folder_name()).join("gaiad")
}
fn default_cli_binary() -> PathBuf {
    Path::new("builds/Gaia").join(os_folder_name()).join("gaiacli")
}
fn default_app_binary() -> PathBuf {
    PathBuf::from("node_modules/.bin/electron")
}
fn default_app_main() -> PathBuf {
    PathBuf::from("app/dist/main.js")
}
fn default_driver_binary() -> PathBuf {
    PathBuf::from("chromedriver")
}

/// Artifact directory settings
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("testArtifacts")
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Time allowed for the automation session to come up
    #[serde(default = "default_app_start")]
    pub app_start_secs: u64,

    /// Readiness wait after a start
    #[serde(default = "default_app_wait")]
    pub app_wait_secs: u64,

    /// Readiness wait after a soft refresh
    #[serde(default = "default_refresh_wait")]
    pub refresh_wait_secs: u64,

    /// Grace period between SIGTERM and SIGKILL
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            app_start_secs: default_app_start(),
            app_wait_secs: default_app_wait(),
            refresh_wait_secs: default_refresh_wait(),
            terminate_grace_ms: default_terminate_grace(),
        }
    }
}

impl Timeouts {
    pub fn terminate_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.terminate_grace_ms)
    }
}

fn default_app_start() -> u64 {
    10
}
fn default_app_wait() -> u64 {
    10
}
fn default_refresh_wait() -> u64 {
    5
}
fn default_terminate_grace() -> u64 {
    500
}

/// Substrings that mark a first stdout chunk as a failure
#[derive(Debug, Deserialize, Clone)]
pub struct Readiness {
    #[serde(default = "default_failure_markers")]
    pub failure_markers: Vec<String>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            failure_markers: default_failure_markers(),
        }
    }
}

fn default_failure_markers() -> Vec<String> {
    vec!["Failed".to_string(), "Error".to_string()]
}

/// Which config keys get shrunk, and by how much
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimeoutPatch {
    #[serde(default = "default_patch_keys")]
    pub keys: Vec<String>,

    /// Integer divisor applied to every matching value
    #[serde(default = "default_divisor")]
    pub divisor: i64,
}

impl Default for TimeoutPatch {
    fn default() -> Self {
        Self {
            keys: default_patch_keys(),
            divisor: default_divisor(),
        }
    }
}

fn default_patch_keys() -> Vec<String> {
    [
        "timeout_propose",
        "timeout_propose_delta",
        "timeout_prevote",
        "timeout_prevote_delta",
        "timeout_precommit",
        "timeout_precommit_delta",
        "timeout_commit",
        "flush_throttle_timeout",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

fn default_divisor() -> i64 {
    50
}

/// Test account settings
#[derive(Debug, Deserialize, Clone)]
pub struct AccountsConfig {
    /// Passphrase typed into `gaiacli keys add`
    #[serde(default = "default_passphrase")]
    pub passphrase: String,

    /// Owner key password typed into `gaiad init`
    #[serde(default = "default_owner_password")]
    pub owner_password: String,

    /// Account recovered from the genesis secret; owns the test tokens
    #[serde(default = "default_primary")]
    pub primary: String,

    /// Freshly generated receiving account
    #[serde(default = "default_secondary")]
    pub secondary: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
            owner_password: default_owner_password(),
            primary: default_primary(),
            secondary: default_secondary(),
        }
    }
}

fn default_passphrase() -> String {
    "1234567890".to_string()
}
fn default_owner_password() -> String {
    "12345678".to_string()
}
fn default_primary() -> String {
    "testkey".to_string()
}
fn default_secondary() -> String {
    "testreceiver".to_string()
}

/// DOM readiness markers
#[derive(Debug, Deserialize, Clone)]
pub struct Selectors {
    /// Marker awaited by the first probe start
    #[serde(default = "default_probe_selector")]
    pub probe: String,

    /// Marker awaited once accounts exist
    #[serde(default = "default_session_selector")]
    pub session: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            probe: default_probe_selector(),
            session: default_session_selector(),
        }
    }
}

fn default_probe_selector() -> String {
    ".tm-session".to_string()
}
fn default_session_selector() -> String {
    ".tm-session-title=Sign In".to_string()
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if no file exists. Environment
    /// overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(config_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a configuration file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Apply `BINARY_PATH`-style overrides from the process environment
    pub fn apply_env(&mut self) {
        let overrides = [
            ("NODE_BINARY_PATH", &mut self.binaries.node),
            ("BINARY_PATH", &mut self.binaries.cli),
            ("APP_BINARY_PATH", &mut self.binaries.app),
            ("DRIVER_BINARY_PATH", &mut self.binaries.driver),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = PathBuf::from(value);
                }
            }
        }
    }

    /// Resolve a bare binary name on PATH, leaving real paths alone
    pub fn resolve_binary(path: &Path) -> PathBuf {
        if path.components().count() == 1 {
            if let Ok(found) = which::which(path) {
                return found;
            }
        }
        path.to_path_buf()
    }
}
