//! Test runner implementation
//!
//! Executes scenarios against the launched app through the app driver, so
//! every step gets the same readiness waits and crash handling as the launch
//! itself.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;

use crate::app::{AppDriver, Selector};
use crate::common::paths::ArtifactPaths;
use crate::common::{Error, Result};
use crate::orchestrator::Orchestrator;

use super::config::{TestScenario, TestStep};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

/// What steps need besides the app
pub struct StepContext<'a> {
    pub paths: &'a ArtifactPaths,
    /// Selector used when a step names none
    pub default_selector: &'a str,
    pub wait_timeout: Duration,
    pub verbose: bool,
}

/// Run a test scenario from a YAML file against the launched environment
pub async fn run_scenario(
    orchestrator: &Orchestrator,
    path: &Path,
    verbose: bool,
) -> Result<TestResult> {
    let scenario = TestScenario::load(path)?;

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let state = orchestrator.launch().await?;
    let config = orchestrator.config();
    let ctx = StepContext {
        paths: orchestrator.paths(),
        default_selector: &config.selectors.session,
        wait_timeout: Duration::from_secs(config.timeouts.app_wait_secs),
        verbose,
    };

    let mut app = state.app.lock().await;
    Ok(run_steps(&mut app, &scenario, &ctx).await)
}

/// Execute every step in order, stopping at the first failure
pub async fn run_steps(
    app: &mut AppDriver,
    scenario: &TestScenario,
    ctx: &StepContext<'_>,
) -> TestResult {
    let steps_total = scenario.steps.len();
    println!("\n{}", "Steps:".cyan());

    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;

        if let Err(e) = execute_step(app, step, step_num, ctx).await {
            println!("  {} Step {}: {}", "✗".red(), step_num, e);
            return TestResult {
                name: scenario.name.clone(),
                passed: false,
                steps_run: step_num,
                steps_total,
                error: Some(e.to_string()),
            };
        }
    }

    println!(
        "\n{} {}\n",
        "✓".green().bold(),
        "Test Passed".green().bold()
    );

    TestResult {
        name: scenario.name.clone(),
        passed: true,
        steps_run: steps_total,
        steps_total,
        error: None,
    }
}

/// Execute a single test step
async fn execute_step(
    app: &mut AppDriver,
    step: &TestStep,
    step_num: usize,
    ctx: &StepContext<'_>,
) -> Result<()> {
    let description = match step {
        TestStep::WaitFor { selector, timeout } => {
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or(ctx.wait_timeout);
            app.wait_for(&Selector::parse(selector), timeout).await?;
            format!("wait for {}", selector)
        }
        TestStep::Restart { selector } => {
            let selector = Selector::parse(selector.as_deref().unwrap_or(ctx.default_selector));
            app.restart(&selector).await?;
            format!("restart, wait for {}", selector)
        }
        TestStep::Refresh { selector } => {
            let selector = Selector::parse(selector.as_deref().unwrap_or(ctx.default_selector));
            app.refresh(&selector).await?;
            format!("refresh, wait for {}", selector)
        }
        TestStep::SetLocalStorage { key, value } => {
            app.set_local_storage(key, value).await?;
            format!("localStorage[{}] = {}", key, value)
        }
        TestStep::ExpectLocalStorage { key, equals } => {
            let actual = app.local_storage(key).await?;
            if actual != *equals {
                return Err(Error::TestAssertion(format!(
                    "localStorage[{}]: expected {:?}, got {:?}",
                    key, equals, actual
                )));
            }
            format!("localStorage[{}] == {:?}", key, equals)
        }
        TestStep::Screenshot { path } => {
            let target = if path.is_relative() {
                ctx.paths.root().join(path)
            } else {
                path.clone()
            };
            app.capture_screenshot(&target).await?;
            if ctx.verbose {
                println!("    {}", target.display().to_string().dimmed());
            }
            format!("screenshot {}", path.display())
        }
    };

    println!(
        "  {} Step {}: {}",
        "✓".green(),
        step_num,
        description.dimmed()
    );
    Ok(())
}
