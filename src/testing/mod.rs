//! YAML scenario runner
//!
//! Scenarios describe GUI checks to run once the environment is launched:
//! readiness waits, restarts, local storage and screenshots. Assertions are
//! made through the app driver rather than by scraping console output.

mod config;
mod runner;

pub use config::*;
pub use runner::{run_scenario, run_steps, StepContext, TestResult};
