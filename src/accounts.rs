//! Test account provisioning through `gaiacli keys add`
//!
//! gaiacli prompts for a passphrase and, with `--recover`, a seed phrase. Both
//! are written to stdin straight after spawn; this relies on gaiacli always
//! asking in that order. All accounts share one keystore directory, so they
//! are created one after another and never concurrently.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::config::Config;
use crate::common::paths::ArtifactPaths;
use crate::common::Result;
use crate::process::{self, FirstChunkClassifier, ProcessSpec};

/// A key created in the test keystore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub pub_key: Option<String>,
    /// Generated mnemonic; absent when the key was recovered
    #[serde(default)]
    pub seed: Option<String>,
    /// Set by the harness, not by gaiacli
    #[serde(default)]
    pub recovered: bool,
}

/// One account to create
#[derive(Debug, Clone)]
pub struct AccountRequest {
    pub name: String,
    pub seed: Option<String>,
}

impl AccountRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: None,
        }
    }

    pub fn recover(name: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: Some(seed.into()),
        }
    }
}

/// Creates keys with the wallet CLI in one keystore
#[derive(Debug, Clone)]
pub struct AccountProvisioner {
    binary: PathBuf,
    keystore: PathBuf,
    passphrase: String,
}

impl AccountProvisioner {
    pub fn new(config: &Config, paths: &ArtifactPaths) -> Self {
        Self {
            binary: Config::resolve_binary(&config.binaries.cli),
            keystore: paths.keystore(),
            passphrase: config.accounts.passphrase.clone(),
        }
    }

    fn spec(&self, name: &str, seed: Option<&str>) -> ProcessSpec {
        let mut spec = ProcessSpec::new(&self.binary, FirstChunkClassifier::json_object())
            .args(["keys", "add", name]);
        if seed.is_some() {
            spec = spec.arg("--recover");
        }
        spec = spec
            .arg("--home")
            .path_arg(&self.keystore)
            .args(["--output", "json"])
            .stdin_line(self.passphrase.clone());
        if let Some(seed) = seed {
            spec = spec.stdin_line(seed);
        }
        spec
    }

    /// Create `name`, recovering it from `seed` when given
    pub async fn create_account(&self, name: &str, seed: Option<&str>) -> Result<Account> {
        let spawned = process::run(self.spec(name, seed)).await?;
        let mut account: Account = spawned.json()?;
        account.recovered = seed.is_some();
        tracing::info!(name = %account.name, address = %account.address, recovered = account.recovered, "Created account");
        Ok(account)
    }

    /// Create every request in order, waiting for each before the next
    pub async fn create_accounts(&self, requests: &[AccountRequest]) -> Result<Vec<Account>> {
        let mut accounts = Vec::with_capacity(requests.len());
        for request in requests {
            accounts.push(
                self.create_account(&request.name, request.seed.as_deref())
                    .await?,
            );
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisioner() -> AccountProvisioner {
        let mut config = Config::default();
        config.binaries.cli = PathBuf::from("/opt/gaia/gaiacli");
        AccountProvisioner::new(&config, &ArtifactPaths::new("/tmp/artifacts"))
    }

    #[test]
    fn test_recover_spec() {
        let spec = provisioner().spec("testkey", Some("word word word"));
        assert_eq!(
            spec.args,
            [
                "keys",
                "add",
                "testkey",
                "--recover",
                "--home",
                "/tmp/artifacts/cli_home/lcd",
                "--output",
                "json"
            ]
        );
        assert_eq!(spec.stdin, ["1234567890", "word word word"]);
    }

    #[test]
    fn test_new_key_spec_omits_recover() {
        let spec = provisioner().spec("testreceiver", None);
        assert!(!spec.args.contains(&"--recover".to_string()));
        assert_eq!(spec.stdin, ["1234567890"]);
    }

    #[test]
    fn test_account_from_gaiacli_output() {
        let account: Account = serde_json::from_str(
            r#"{"name":"testreceiver","type":"local","address":"cosmos1abc","pub_key":"cosmospub1xyz","seed":"a b c"}"#,
        )
        .unwrap();
        assert_eq!(account.address, "cosmos1abc");
        assert_eq!(account.seed.as_deref(), Some("a b c"));
        assert!(!account.recovered);
    }
}
