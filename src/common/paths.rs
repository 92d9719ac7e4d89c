//! Artifact directory layout and configuration paths
//!
//! Everything a run produces lives under one artifact directory so CI can
//! upload it as a single folder:
//!
//! ```text
//! <artifacts>/cli_home/             wallet home handed to the GUI
//! <artifacts>/cli_home/lcd/         gaiacli keystore
//! <artifacts>/node_home/            gaiad home
//! <artifacts>/node_home/config/gaiaversion.txt
//! <artifacts>/main-process.log
//! <artifacts>/renderer-process.log
//! <artifacts>/snapshot.png
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "voyager-e2e";

/// Resolved locations inside one artifact directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Home directory of the wallet, as seen by the GUI
    pub fn cli_home(&self) -> PathBuf {
        self.root.join("cli_home")
    }

    /// Keystore directory passed to `gaiacli --home`
    pub fn keystore(&self) -> PathBuf {
        self.cli_home().join("lcd")
    }

    pub fn node_home(&self) -> PathBuf {
        self.root.join("node_home")
    }

    /// Network config directory the GUI copies its settings from
    pub fn node_config_dir(&self) -> PathBuf {
        self.node_home().join("config")
    }

    pub fn node_config_file(&self) -> PathBuf {
        self.node_config_dir().join("config.toml")
    }

    pub fn version_file(&self) -> PathBuf {
        self.node_config_dir().join("gaiaversion.txt")
    }

    pub fn main_process_log(&self) -> PathBuf {
        self.root.join("main-process.log")
    }

    pub fn renderer_process_log(&self) -> PathBuf {
        self.root.join("renderer-process.log")
    }

    pub fn screenshot(&self) -> PathBuf {
        self.root.join("snapshot.png")
    }

    /// Remove both homes left by a previous run and recreate the root
    ///
    /// Log files and screenshots are kept; they are appended to.
    pub fn clean(&self) -> io::Result<()> {
        for dir in [self.cli_home(), self.node_home()] {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        std::fs::create_dir_all(&self.root)
    }
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/voyager-e2e/`
/// - macOS: `~/Library/Application Support/voyager-e2e/`
/// - Windows: `%APPDATA%\voyager-e2e\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
