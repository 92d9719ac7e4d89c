//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch node, accounts and app, then hold until Ctrl-C
    Launch,

    /// Launch the environment and execute YAML test scenarios against it
    Run {
        /// Paths to the YAML test scenario files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// Shrink the consensus timeouts of a node config.toml in place
    PatchConfig {
        /// Path to the node's config.toml
        path: PathBuf,
    },

    /// Create a key in the test keystore
    CreateAccount {
        /// Key name
        name: String,

        /// Recover the key from this seed phrase
        #[arg(long)]
        seed: Option<String>,
    },
}
