//! GUI lifecycle on top of an [`AutomationClient`]
//!
//! Every start and refresh waits for a DOM marker before it counts as done.
//! Failures in either are routed through crash recovery before they are
//! returned.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::common::config::Timeouts;
use crate::common::paths::ArtifactPaths;
use crate::common::{Error, Result};
use crate::crash::{CrashOutcome, CrashRecovery};

use super::automation::{AppLaunch, AutomationClient, Selector};
use super::logs;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state of the GUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppState::NotStarted => "not started",
            AppState::Starting => "starting",
            AppState::Running => "running",
            AppState::Stopping => "stopping",
            AppState::Stopped => "stopped",
            AppState::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

pub struct AppDriver {
    client: Box<dyn AutomationClient>,
    launch: AppLaunch,
    state: AppState,
    paths: ArtifactPaths,
    crash: Arc<CrashRecovery>,
    wait_timeout: Duration,
    refresh_timeout: Duration,
}

impl AppDriver {
    pub fn new(
        client: Box<dyn AutomationClient>,
        launch: AppLaunch,
        paths: ArtifactPaths,
        crash: Arc<CrashRecovery>,
        timeouts: &Timeouts,
    ) -> Self {
        Self {
            client,
            launch,
            state: AppState::NotStarted,
            paths,
            crash,
            wait_timeout: Duration::from_secs(timeouts.app_wait_secs),
            refresh_timeout: Duration::from_secs(timeouts.refresh_wait_secs),
        }
    }

    /// Override both readiness waits
    pub fn with_wait_timeouts(mut self, wait: Duration, refresh: Duration) -> Self {
        self.wait_timeout = wait;
        self.refresh_timeout = refresh;
        self
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.client.is_running()
    }

    pub fn launch(&self) -> &AppLaunch {
        &self.launch
    }

    /// Start the GUI and wait until `selector` exists
    pub async fn start(&mut self, selector: &Selector) -> Result<()> {
        if !matches!(self.state, AppState::NotStarted | AppState::Stopped) {
            return Err(Error::invalid_state("start", self.state));
        }

        tracing::info!(selector = %selector, "Starting app");
        self.state = AppState::Starting;

        let started = match self.client.start(&self.launch).await {
            Ok(()) => self.wait_for(selector, self.wait_timeout).await,
            Err(e) => Err(e),
        };

        match started {
            Ok(()) => {
                self.state = AppState::Running;
                tracing::info!("App is running");
                Ok(())
            }
            Err(e) => {
                self.state = AppState::Crashed;
                self.handle_crash(&e).await;
                Err(e)
            }
        }
    }

    /// Stop the GUI if it is running
    ///
    /// Under CI the logs are persisted first since stopping discards them.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.client.is_running() {
            if matches!(
                self.state,
                AppState::Running | AppState::Crashed | AppState::Starting
            ) {
                self.state = AppState::Stopped;
            }
            return Ok(());
        }

        self.state = AppState::Stopping;
        if self.crash.environment().flags().ci {
            if let Err(e) = logs::write_logs(self.client.as_mut(), &self.paths).await {
                tracing::warn!("Failed to write app logs: {}", e);
            }
        }

        match self.client.stop().await {
            Ok(()) => {
                self.state = AppState::Stopped;
                tracing::info!("App stopped");
                Ok(())
            }
            Err(e) => {
                self.state = AppState::Crashed;
                Err(e)
            }
        }
    }

    pub async fn restart(&mut self, selector: &Selector) -> Result<()> {
        self.stop().await?;
        self.start(selector).await
    }

    /// Reload the view without restarting the process
    pub async fn refresh(&mut self, selector: &Selector) -> Result<()> {
        if self.crash.environment().flags().ci && self.client.is_running() {
            if let Err(e) = logs::write_logs(self.client.as_mut(), &self.paths).await {
                tracing::warn!("Failed to write app logs: {}", e);
            }
        }
        if self.state != AppState::Running {
            return Err(Error::invalid_state("refresh", self.state));
        }

        tracing::info!(selector = %selector, "Refreshing app");
        let refreshed = match self.client.refresh().await {
            Ok(()) => self.wait_for(selector, self.refresh_timeout).await,
            Err(e) => Err(e),
        };

        if let Err(e) = refreshed {
            self.state = AppState::Crashed;
            self.handle_crash(&e).await;
            return Err(e);
        }
        Ok(())
    }

    /// Poll until `selector` exists, giving up once `timeout` has passed
    ///
    /// The timeout also bounds a lookup that is still in flight.
    pub async fn wait_for(&mut self, selector: &Selector, timeout: Duration) -> Result<()> {
        let poll = poll_until_exists(self.client.as_mut(), selector);
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::ReadinessTimeout {
                selector: selector.to_string(),
                timeout,
            }),
        }
    }

    pub async fn set_local_storage(&mut self, key: &str, value: &str) -> Result<()> {
        self.client.set_local_storage(key, value).await
    }

    pub async fn local_storage(&mut self, key: &str) -> Result<Option<String>> {
        self.client.local_storage(key).await
    }

    /// Save the current window as PNG at `path`
    pub async fn capture_screenshot(&mut self, path: &Path) -> Result<()> {
        let png = self.client.capture_page().await?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, png)?;
        Ok(())
    }

    /// Route `error` through crash recovery with this GUI attached
    pub async fn handle_crash(&mut self, error: &Error) -> CrashOutcome {
        self.crash
            .handle_crash(Some(self.client.as_mut()), error)
            .await
    }
}

async fn poll_until_exists(
    client: &mut dyn AutomationClient,
    selector: &Selector,
) -> Result<()> {
    while !client.exists(selector).await? {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::memory::InMemoryClient;
    use crate::common::config::Config;
    use crate::common::{Environment, RunFlags};
    use std::sync::Mutex;

    const SESSION: &str = ".tm-session-title=Sign In";

    struct Fixture {
        driver: AppDriver,
        client: InMemoryClient,
        exits: Arc<Mutex<Vec<i32>>>,
        _dir: tempfile::TempDir,
    }

    fn fixture(flags: RunFlags) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorded = exits.clone();
        let crash = CrashRecovery::new(paths.clone(), Environment::Fixed(flags))
            .with_exit_hook(Arc::new(move |code| recorded.lock().unwrap().push(code)));
        let client = InMemoryClient::with_selectors(&[SESSION]);
        let config = Config::default();
        let driver = AppDriver::new(
            Box::new(client.clone()),
            AppLaunch::from_config(&config, &paths),
            paths,
            Arc::new(crash),
            &config.timeouts,
        )
        .with_wait_timeouts(Duration::from_millis(300), Duration::from_millis(300));
        Fixture {
            driver,
            client,
            exits,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_start_waits_for_selector() {
        let mut f = fixture(RunFlags::default());
        f.driver.start(&Selector::parse(SESSION)).await.unwrap();
        assert_eq!(f.driver.state(), AppState::Running);
        assert!(f.driver.is_running());
        assert_eq!(f.client.state().starts, 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let mut f = fixture(RunFlags::default());
        let selector = Selector::parse(SESSION);
        f.driver.start(&selector).await.unwrap();
        let err = f.driver.start(&selector).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(f.client.state().starts, 1);
    }

    #[tokio::test]
    async fn test_missing_selector_crashes() {
        let mut f = fixture(RunFlags::default());
        let err = f
            .driver
            .start(&Selector::parse(".never-rendered"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReadinessTimeout { .. }));
        assert_eq!(f.driver.state(), AppState::Crashed);
        assert_eq!(*f.exits.lock().unwrap(), [1]);
        // crash recovery stopped the GUI
        assert!(!f.client.state().running);
    }

    #[tokio::test]
    async fn test_failed_start_crashes() {
        let mut f = fixture(RunFlags::default());
        f.client.state().fail_start = true;
        let err = f.driver.start(&Selector::parse(SESSION)).await.unwrap_err();
        assert!(matches!(err, Error::Automation(_)));
        assert_eq!(*f.exits.lock().unwrap(), [1]);
    }

    #[tokio::test]
    async fn test_stop_then_restart() {
        let mut f = fixture(RunFlags::default());
        let selector = Selector::parse(SESSION);
        f.driver.start(&selector).await.unwrap();
        f.driver.stop().await.unwrap();
        assert_eq!(f.driver.state(), AppState::Stopped);
        // stopping a stopped app is a no-op
        f.driver.stop().await.unwrap();
        assert_eq!(f.client.state().stops, 1);

        f.driver.restart(&selector).await.unwrap();
        assert_eq!(f.driver.state(), AppState::Running);
        assert_eq!(f.client.state().starts, 2);
    }

    #[tokio::test]
    async fn test_stop_writes_logs_in_ci() {
        let mut f = fixture(RunFlags {
            ci: true,
            keep_open: false,
        });
        f.driver.start(&Selector::parse(SESSION)).await.unwrap();
        f.client.state().main_logs.push("shutting down".to_string());
        f.driver.stop().await.unwrap();

        let log = std::fs::read_to_string(f.driver.paths.main_process_log()).unwrap();
        assert_eq!(log, "shutting down\n");
    }

    #[tokio::test]
    async fn test_refresh_requires_running() {
        let mut f = fixture(RunFlags::default());
        let selector = Selector::parse(SESSION);
        let err = f.driver.refresh(&selector).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        f.driver.start(&selector).await.unwrap();
        f.driver.refresh(&selector).await.unwrap();
        assert_eq!(f.client.state().refreshes, 1);
    }

    #[tokio::test]
    async fn test_refresh_timeout_crashes() {
        let mut f = fixture(RunFlags::default());
        f.driver.start(&Selector::parse(SESSION)).await.unwrap();

        let err = f
            .driver
            .refresh(&Selector::parse(".never-rendered"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReadinessTimeout { .. }));
        assert_eq!(f.driver.state(), AppState::Crashed);
        assert_eq!(*f.exits.lock().unwrap(), [1]);
        assert!(!f.client.state().running);
    }

    #[tokio::test]
    async fn test_wait_is_bounded_by_slow_lookups() {
        let mut f = fixture(RunFlags::default());
        f.driver.start(&Selector::parse(SESSION)).await.unwrap();
        f.client.state().exists_delay = Some(Duration::from_secs(3));

        let started = std::time::Instant::now();
        let err = f
            .driver
            .wait_for(&Selector::parse(SESSION), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            err.to_string(),
            format!("Timed out after 200ms waiting for '{}'", Selector::parse(SESSION))
        );
    }

    #[tokio::test]
    async fn test_local_storage_pass_through() {
        let mut f = fixture(RunFlags::default());
        f.driver.start(&Selector::parse(SESSION)).await.unwrap();
        f.driver
            .set_local_storage("appOnboardingActive", "false")
            .await
            .unwrap();
        assert_eq!(
            f.driver.local_storage("appOnboardingActive").await.unwrap(),
            Some("false".to_string())
        );
    }
}
