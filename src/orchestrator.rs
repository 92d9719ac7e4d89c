//! Launch orchestration
//!
//! [`Orchestrator::launch`] brings up the whole environment once per process:
//! a fresh local node, two funded test accounts and the GUI sitting on its
//! sign-in screen with onboarding disabled. Every caller shares that one
//! launch, and a failed launch stays failed.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::accounts::{Account, AccountProvisioner, AccountRequest};
use crate::app::{AppDriver, AppLaunch, AutomationClient, Selector};
use crate::common::config::Config;
use crate::common::paths::ArtifactPaths;
use crate::common::{Environment, Error, Result};
use crate::crash::{CrashOutcome, CrashRecovery, ExitHook};
use crate::node::{InitPayload, NodeLifecycle};

/// Local storage key that shows the onboarding wizard
pub const ONBOARDING_KEY: &str = "appOnboardingActive";

/// Everything a test needs from a finished launch
pub struct LaunchState {
    pub app: Arc<Mutex<AppDriver>>,
    pub paths: ArtifactPaths,
    /// Primary (recovered genesis owner) first, then the secondary
    pub accounts: Vec<Account>,
    pub init: InitPayload,
}

impl std::fmt::Debug for LaunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchState")
            .field("paths", &self.paths)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

pub struct Orchestrator {
    config: Config,
    paths: ArtifactPaths,
    crash: Arc<CrashRecovery>,
    /// Handed to the app driver when it is first needed
    automation: std::sync::Mutex<Option<Box<dyn AutomationClient>>>,
    app: OnceCell<Arc<Mutex<AppDriver>>>,
    launched: OnceCell<std::result::Result<Arc<LaunchState>, String>>,
}

impl Orchestrator {
    /// Orchestrator reading CI flags from the environment and exiting the
    /// process on crash
    pub fn new(config: Config, automation: Box<dyn AutomationClient>) -> Self {
        let paths = ArtifactPaths::new(&config.artifacts.dir);
        let crash = CrashRecovery::new(paths.clone(), Environment::Process)
            .with_terminate_grace(config.timeouts.terminate_grace());
        Self::build(config, paths, automation, crash)
    }

    /// Orchestrator with fixed flags and a custom exit hook
    pub fn with_crash_recovery(
        config: Config,
        automation: Box<dyn AutomationClient>,
        env: Environment,
        exit: ExitHook,
    ) -> Self {
        let paths = ArtifactPaths::new(&config.artifacts.dir);
        let crash = CrashRecovery::new(paths.clone(), env)
            .with_exit_hook(exit)
            .with_terminate_grace(config.timeouts.terminate_grace());
        Self::build(config, paths, automation, crash)
    }

    fn build(
        config: Config,
        paths: ArtifactPaths,
        automation: Box<dyn AutomationClient>,
        crash: CrashRecovery,
    ) -> Self {
        Self {
            config,
            paths,
            crash: Arc::new(crash),
            automation: std::sync::Mutex::new(Some(automation)),
            app: OnceCell::new(),
            launched: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn crash_recovery(&self) -> &CrashRecovery {
        &self.crash
    }

    /// Launch the environment, or return the launch already under way
    ///
    /// Concurrent callers wait for the same launch. A failure is routed
    /// through crash recovery once and every later call returns
    /// [`Error::LaunchFailed`] without retrying.
    pub async fn launch(&self) -> Result<Arc<LaunchState>> {
        let launched = self
            .launched
            .get_or_init(|| async {
                match self.boot().await {
                    Ok(state) => Ok(Arc::new(state)),
                    Err(e) => {
                        self.route_crash(&e).await;
                        Err(e.to_string())
                    }
                }
            })
            .await;
        launched.clone().map_err(Error::LaunchFailed)
    }

    async fn boot(&self) -> Result<LaunchState> {
        tracing::info!(
            node = %self.config.binaries.node.display(),
            cli = %self.config.binaries.cli.display(),
            artifacts = %self.paths.root().display(),
            "Launching test environment"
        );
        self.paths.clean()?;

        let node = NodeLifecycle::new(&self.config, self.paths.clone());
        let init = node.init().await?;
        node.reduce_timeouts()?;
        // owned by crash recovery so a crash can still stop it
        self.crash.adopt(node.start().await?).await;
        node.save_version().await?;

        let app = self.app().await?;
        let mut driver = app.lock().await;

        // a first start lets the GUI create its home before keys are added
        driver
            .start(&Selector::parse(&self.config.selectors.probe))
            .await?;
        driver.stop().await?;

        let provisioner = AccountProvisioner::new(&self.config, &self.paths);
        let accounts = provisioner
            .create_accounts(&[
                // must match the genesis owner to hold tokens
                AccountRequest::recover(
                    &self.config.accounts.primary,
                    &init.app_message.secret,
                ),
                AccountRequest::new(&self.config.accounts.secondary),
            ])
            .await?;

        driver
            .start(&Selector::parse(&self.config.selectors.session))
            .await?;
        driver.set_local_storage(ONBOARDING_KEY, "false").await?;
        drop(driver);

        tracing::info!(accounts = accounts.len(), "Test environment ready");
        Ok(LaunchState {
            app,
            paths: self.paths.clone(),
            accounts,
            init,
        })
    }

    /// The app driver, created on first use
    async fn app(&self) -> Result<Arc<Mutex<AppDriver>>> {
        self.app
            .get_or_try_init(|| async {
                let client = self
                    .automation
                    .lock()
                    .map_err(|_| Error::Internal("automation client lock poisoned".to_string()))?
                    .take()
                    .ok_or_else(|| Error::Internal("automation client already taken".to_string()))?;
                let driver = AppDriver::new(
                    client,
                    AppLaunch::from_config(&self.config, &self.paths),
                    self.paths.clone(),
                    self.crash.clone(),
                    &self.config.timeouts,
                );
                Ok::<_, Error>(Arc::new(Mutex::new(driver)))
            })
            .await
            .cloned()
    }

    fn launched_app(&self) -> Result<Arc<Mutex<AppDriver>>> {
        match self.launched.get() {
            Some(Ok(state)) => Ok(state.app.clone()),
            Some(Err(e)) => Err(Error::LaunchFailed(e.clone())),
            None => Err(Error::NotLaunched),
        }
    }

    fn selector(&self, selector: Option<&str>) -> Selector {
        Selector::parse(selector.unwrap_or(&self.config.selectors.session))
    }

    /// Send `error` to crash recovery, with the GUI when there is one
    ///
    /// Waits for the app lock, so it must not be called while holding it.
    async fn route_crash(&self, error: &Error) -> CrashOutcome {
        match self.app.get() {
            Some(app) => app.lock().await.handle_crash(error).await,
            None => self.crash.handle_crash(None, error).await,
        }
    }

    /// Stop and start the launched app, waiting for `selector`
    pub async fn restart(&self, selector: Option<&str>) -> Result<()> {
        let selector = self.selector(selector);
        tracing::info!("Restarting app");
        self.launched_app()?.lock().await.restart(&selector).await
    }

    /// Soft-reload the launched app, waiting for `selector`
    pub async fn refresh(&self, selector: Option<&str>) -> Result<()> {
        let selector = self.selector(selector);
        self.launched_app()?.lock().await.refresh(&selector).await
    }

    /// Stop the app if one was created
    pub async fn stop(&self) -> Result<()> {
        match self.app.get() {
            Some(app) => app.lock().await.stop().await,
            None => Ok(()),
        }
    }

    /// Await `fut`, routing any error through crash recovery
    ///
    /// This is the top-level error boundary for a run: failures that escape
    /// a test end up here instead of being lost.
    pub async fn supervise<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.route_crash(&e).await;
                Err(e)
            }
        }
    }

    /// Stop the app and the local node
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down test environment");
        let stopped = self.stop().await;
        self.crash.terminate_children().await?;
        stopped
    }

    /// End the run: tear everything down and exit with 0
    pub async fn finish(&self) {
        if let Err(e) = self.shutdown().await {
            tracing::warn!("Cleanup failed: {}", e);
        }
        self.crash.exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::InMemoryClient;
    use crate::common::RunFlags;

    fn orchestrator(dir: &std::path::Path) -> (Orchestrator, Arc<std::sync::Mutex<Vec<i32>>>) {
        let mut config = Config::default();
        config.artifacts.dir = dir.to_path_buf();
        config.binaries.node = "/nonexistent/gaiad".into();
        let exits = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = exits.clone();
        let orchestrator = Orchestrator::with_crash_recovery(
            config,
            Box::new(InMemoryClient::new()),
            Environment::Fixed(RunFlags::default()),
            Arc::new(move |code| recorded.lock().unwrap().push(code)),
        );
        (orchestrator, exits)
    }

    #[tokio::test]
    async fn test_operations_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _) = orchestrator(dir.path());
        assert!(matches!(
            orchestrator.restart(None).await,
            Err(Error::NotLaunched)
        ));
        assert!(matches!(
            orchestrator.refresh(None).await,
            Err(Error::NotLaunched)
        ));
        // nothing to stop yet
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_launch_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, exits) = orchestrator(dir.path());

        let first = orchestrator.launch().await.unwrap_err();
        let second = orchestrator.launch().await.unwrap_err();
        assert!(matches!(first, Error::LaunchFailed(_)));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(*exits.lock().unwrap(), [1]);
        assert!(matches!(
            orchestrator.restart(None).await,
            Err(Error::LaunchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_supervise_routes_errors_once() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, exits) = orchestrator(dir.path());

        let value = orchestrator.supervise(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(exits.lock().unwrap().is_empty());

        let result: Result<()> = orchestrator
            .supervise(async { Err(Error::TestAssertion("balance".into())) })
            .await;
        assert!(result.is_err());
        let _ = orchestrator
            .supervise(async { Err::<(), _>(Error::TestAssertion("again".into())) })
            .await;
        assert_eq!(*exits.lock().unwrap(), [1]);
        assert!(orchestrator.crash_recovery().has_crashed());
    }

    #[tokio::test]
    async fn test_finish_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, exits) = orchestrator(dir.path());
        orchestrator.finish().await;
        assert_eq!(*exits.lock().unwrap(), [0]);
    }
}
