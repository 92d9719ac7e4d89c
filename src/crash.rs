//! Exactly-once crash handling
//!
//! The first failure of a run collects whatever evidence is still reachable
//! (logs, a screenshot), then stops the GUI, terminates the background
//! processes it was handed and exits. Every later failure is ignored: by then
//! the run is already being torn down and a second report would only bury the
//! first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::app::{logs, AutomationClient};
use crate::common::paths::ArtifactPaths;
use crate::common::{Environment, Error, Result};
use crate::process::ProcessHandle;

const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Called with the exit code once the run has to end
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// What a call to [`CrashRecovery::handle_crash`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashOutcome {
    /// An earlier crash was already handled
    AlreadyHandled,
    /// Evidence collected, app stopped, exit hook called with 1
    Terminated,
    /// Evidence collected, app left running for inspection
    KeptOpen,
}

pub struct CrashRecovery {
    crashed: AtomicBool,
    paths: ArtifactPaths,
    env: Environment,
    exit: ExitHook,
    /// Background processes that must not outlive the run
    children: Mutex<Vec<ProcessHandle>>,
    grace: Duration,
}

impl std::fmt::Debug for CrashRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashRecovery")
            .field("crashed", &self.crashed)
            .field("paths", &self.paths)
            .field("env", &self.env)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl CrashRecovery {
    /// Crash handling that exits the process
    pub fn new(paths: ArtifactPaths, env: Environment) -> Self {
        Self {
            crashed: AtomicBool::new(false),
            paths,
            env,
            exit: Arc::new(|code| std::process::exit(code)),
            children: Mutex::new(Vec::new()),
            grace: DEFAULT_TERMINATE_GRACE,
        }
    }

    /// How long a child gets to exit after SIGTERM
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Replace what happens on exit
    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    pub fn environment(&self) -> Environment {
        self.env
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn exit(&self, code: i32) {
        (self.exit)(code)
    }

    /// Take ownership of a background process
    ///
    /// It is terminated by [`terminate_children`](Self::terminate_children)
    /// or before a crash exits the run.
    pub async fn adopt(&self, handle: ProcessHandle) {
        self.children.lock().await.push(handle);
    }

    /// Pids of the adopted processes still owned here
    pub async fn child_pids(&self) -> Vec<u32> {
        self.children
            .lock()
            .await
            .iter()
            .filter_map(ProcessHandle::pid)
            .collect()
    }

    /// Terminate every adopted process, newest first
    ///
    /// All children are attempted; the first error is returned.
    pub async fn terminate_children(&self) -> Result<()> {
        let children = std::mem::take(&mut *self.children.lock().await);
        let mut result = Ok(());
        for mut child in children.into_iter().rev() {
            if let Err(e) = child.terminate(self.grace).await {
                tracing::warn!(command = %child.command(), "Failed to terminate: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Record the first crash of the run
    ///
    /// `app` is the GUI client when one has been constructed. Collecting logs
    /// and the screenshot may fail on a half-dead GUI; those failures are
    /// logged and the teardown goes ahead regardless.
    pub async fn handle_crash(
        &self,
        mut app: Option<&mut dyn AutomationClient>,
        error: &Error,
    ) -> CrashOutcome {
        if self.crashed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Ignoring failure after crash: {}", error);
            return CrashOutcome::AlreadyHandled;
        }

        tracing::error!("Crash: {}", error);
        let flags = self.env.flags();

        if let Some(client) = app.as_deref_mut() {
            let collected = if flags.ci {
                logs::write_logs(client, &self.paths).await
            } else {
                logs::print_logs(client).await
            };
            if let Err(e) = collected {
                tracing::warn!("Failed to collect app logs: {}", e);
            }

            if client.has_window() {
                if let Err(e) = self.save_screenshot(client).await {
                    tracing::warn!("Failed to save screenshot: {}", e);
                }
            }
        }

        if flags.keep_open {
            tracing::warn!("Keeping app open after crash");
            return CrashOutcome::KeptOpen;
        }

        if let Some(client) = app {
            if client.is_running() {
                if let Err(e) = client.stop().await {
                    tracing::warn!("Failed to stop app: {}", e);
                }
            }
        }
        // exiting runs no destructors, so the node has to go first
        if let Err(e) = self.terminate_children().await {
            tracing::warn!("Failed to stop background processes: {}", e);
        }
        self.exit(1);
        CrashOutcome::Terminated
    }

    async fn save_screenshot(&self, client: &mut dyn AutomationClient) -> Result<()> {
        let png = client.capture_page().await?;
        let path = self.paths.screenshot();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, png)?;
        tracing::info!(path = %path.display(), "Saved screenshot");
        Ok(())
    }
}
