//! gaiad init, start and version

use std::path::PathBuf;

use serde::Deserialize;

use crate::common::config::{Config, TimeoutPatch};
use crate::common::paths::ArtifactPaths;
use crate::common::Result;
use crate::process::{self, FirstChunkClassifier, ProcessHandle, ProcessSpec};

use super::config_patch;

/// JSON printed by `gaiad init`
#[derive(Debug, Clone, Deserialize)]
pub struct InitPayload {
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    pub app_message: AppMessage,
}

/// Genesis account created by `gaiad init --owk`
#[derive(Debug, Clone, Deserialize)]
pub struct AppMessage {
    /// Seed phrase of the account holding the genesis tokens
    pub secret: String,
    #[serde(default)]
    pub addr: Option<String>,
}

/// Drives the daemon binary against one node home
#[derive(Debug, Clone)]
pub struct NodeLifecycle {
    binary: PathBuf,
    paths: ArtifactPaths,
    owner_password: String,
    failure_markers: Vec<String>,
    patch: TimeoutPatch,
}

impl NodeLifecycle {
    pub fn new(config: &Config, paths: ArtifactPaths) -> Self {
        Self {
            binary: Config::resolve_binary(&config.binaries.node),
            paths,
            owner_password: config.accounts.owner_password.clone(),
            failure_markers: config.readiness.failure_markers.clone(),
            patch: config.patch.clone(),
        }
    }

    fn spec(&self) -> ProcessSpec {
        ProcessSpec::new(
            &self.binary,
            FirstChunkClassifier::with_markers(&self.failure_markers),
        )
    }

    /// Create a fresh node home with a genesis owner key
    pub async fn init(&self) -> Result<InitPayload> {
        let spec = self
            .spec()
            .arg("init")
            .arg("--home")
            .path_arg(&self.paths.node_home())
            .args(["--name", "local", "--owk", "--overwrite"])
            .stdin_line(self.owner_password.clone());

        let spawned = process::run(spec).await?;
        let payload: InitPayload = spawned.json()?;
        tracing::info!(chain_id = ?payload.chain_id, "Initialized local node");
        Ok(payload)
    }

    /// Shrink consensus timeouts in the freshly initialized config
    pub fn reduce_timeouts(&self) -> Result<()> {
        config_patch::reduce_timeouts(&self.paths.node_config_file(), &self.patch)
    }

    /// Start the daemon in the background
    ///
    /// Resolves once the first output line is clean. The daemon keeps running;
    /// the returned handle is the only way to stop it before the harness exits.
    pub async fn start(&self) -> Result<ProcessHandle> {
        let spec = self
            .spec()
            .arg("start")
            .arg("--home")
            .path_arg(&self.paths.node_home());

        let spawned = process::run(spec).await?;
        tracing::info!(pid = ?spawned.handle.pid(), "Started local node");
        Ok(spawned.handle)
    }

    /// Record the daemon version next to the network config the GUI copies
    pub async fn save_version(&self) -> Result<PathBuf> {
        let spawned = process::run(self.spec().arg("version")).await?;
        let path = self.paths.version_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &spawned.output)?;
        tracing::info!(path = %path.display(), version = %spawned.output.trim(), "Saved node version");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    #[test]
    fn test_init_payload_parses_genesis_output() {
        let payload: InitPayload = serde_json::from_str(
            r#"{
                "chain_id": "test-chain-Ab12Cd",
                "node_id": "3f9a",
                "app_message": {
                    "secret": "abandon abandon about",
                    "addr": "cosmos1qqq"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(payload.app_message.secret, "abandon abandon about");
        assert_eq!(payload.chain_id.as_deref(), Some("test-chain-Ab12Cd"));
    }

    #[test]
    fn test_init_payload_requires_secret() {
        let result: std::result::Result<InitPayload, _> =
            serde_json::from_str(r#"{"app_message": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_node_commands_use_configured_markers() {
        let mut config = Config::default();
        config.readiness.failure_markers = vec!["panic".to_string()];
        let node = NodeLifecycle::new(&config, ArtifactPaths::new("/tmp/a"));
        assert_eq!(node.spec().classifier.failure_markers(), ["panic".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_version_file_is_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("gaiad");
        std::fs::write(&binary, "#!/bin/sh\necho 0.33.0\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.binaries.node = binary;
        let paths = ArtifactPaths::new(dir.path().join("artifacts"));
        // a directory where the file should go
        std::fs::create_dir_all(paths.version_file()).unwrap();

        let node = NodeLifecycle::new(&config, paths);
        let err = node.save_version().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{}", err);
    }
}
