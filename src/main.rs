//! Voyager e2e harness CLI
//!
//! Boots a local gaia node, provisions test accounts and drives the Voyager
//! GUI over WebDriver for end-to-end tests.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use harness::common::{config::Config, logging};
use harness::{cli, commands};

#[derive(Parser)]
#[command(name = "harness", about = "End-to-end launch harness for Voyager")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // runs that produce artifacts also keep the harness log with them
    let _guard = match cli.command {
        Commands::Launch | Commands::Run { .. } => logging::init_with_file(&config.artifacts.dir),
        _ => {
            logging::init_cli();
            None
        }
    };

    if let Err(e) = cli::dispatch(cli.command, config).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
