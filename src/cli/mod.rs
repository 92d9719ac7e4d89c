//! CLI command handling
//!
//! Dispatches CLI commands to the orchestrator and formats output.

use colored::Colorize;

use crate::accounts::{Account, AccountProvisioner};
use crate::app::WebDriverClient;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::paths::ArtifactPaths;
use crate::common::{Error, Result};
use crate::node;
use crate::orchestrator::Orchestrator;
use crate::testing;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Launch => {
            let orchestrator = Orchestrator::new(config, Box::new(WebDriverClient::new()?));
            let state = orchestrator.launch().await?;

            println!("{} Test environment ready", "✓".green());
            println!("  artifacts: {}", state.paths.root().display());
            for account in &state.accounts {
                print_account(account);
            }
            println!("Press Ctrl-C to stop.");

            tokio::signal::ctrl_c().await?;
            orchestrator.finish().await;
            Ok(())
        }

        Commands::Run { scenarios, verbose } => {
            let orchestrator = Orchestrator::new(config, Box::new(WebDriverClient::new()?));

            let mut failed = Vec::new();
            for path in &scenarios {
                let result = orchestrator
                    .supervise(testing::run_scenario(&orchestrator, path, verbose))
                    .await?;
                if !result.passed {
                    failed.push(result.name);
                }
            }

            println!(
                "{} of {} scenarios passed",
                scenarios.len() - failed.len(),
                scenarios.len()
            );
            if !failed.is_empty() {
                let error = Error::TestAssertion(format!("failed: {}", failed.join(", ")));
                return orchestrator.supervise(async { Err(error) }).await;
            }

            orchestrator.finish().await;
            Ok(())
        }

        Commands::PatchConfig { path } => {
            node::reduce_timeouts(&path, &config.patch)?;
            println!(
                "{} Reduced timeouts in {} (divisor {})",
                "✓".green(),
                path.display(),
                config.patch.divisor
            );
            Ok(())
        }

        Commands::CreateAccount { name, seed } => {
            let paths = ArtifactPaths::new(&config.artifacts.dir);
            let provisioner = AccountProvisioner::new(&config, &paths);
            let account = provisioner.create_account(&name, seed.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
            Ok(())
        }
    }
}

fn print_account(account: &Account) {
    let origin = if account.recovered {
        "recovered"
    } else {
        "new"
    };
    println!(
        "  {} {} ({})",
        account.name.bold(),
        account.address,
        origin.dimmed()
    );
}
