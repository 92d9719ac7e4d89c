//! In-process automation client
//!
//! Stands in for a real GUI in tests: selectors listed in `present` exist
//! while the client is running, local storage is a map, and every call is
//! counted. Clones share state, so a test can keep one clone for inspection
//! after handing the other to a driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Error, Result};

use super::automation::{AppLaunch, AutomationClient, LogEntry, Selector};

/// Observable state of an [`InMemoryClient`]
#[derive(Debug, Default)]
pub struct InMemoryState {
    pub running: bool,
    /// Raw selectors that exist while running
    pub present: Vec<String>,
    pub local_storage: HashMap<String, String>,
    pub main_logs: Vec<String>,
    pub renderer_logs: Vec<LogEntry>,
    pub launches: Vec<AppLaunch>,
    pub starts: usize,
    pub stops: usize,
    pub refreshes: usize,
    pub log_reads: usize,
    pub screenshots: usize,
    /// Make `start` fail
    pub fail_start: bool,
    /// Make log collection fail
    pub fail_logs: bool,
    /// Make every `exists` lookup this slow
    pub exists_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryClient {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client on which `selectors` exist once started
    pub fn with_selectors<S: AsRef<str>>(selectors: &[S]) -> Self {
        let client = Self::new();
        client.state().present = selectors.iter().map(|s| s.as_ref().to_string()).collect();
        client
    }

    pub fn state(&self) -> MutexGuard<'_, InMemoryState> {
        // a panic while holding the lock already failed the test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AutomationClient for InMemoryClient {
    async fn start(&mut self, launch: &AppLaunch) -> Result<()> {
        let mut state = self.state();
        state.starts += 1;
        state.launches.push(launch.clone());
        if state.fail_start {
            return Err(Error::Automation("app failed to start".to_string()));
        }
        state.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state();
        state.stops += 1;
        state.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state().running
    }

    async fn exists(&mut self, selector: &Selector) -> Result<bool> {
        let delay = self.state().exists_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        Ok(state.running && state.present.iter().any(|p| p == selector.raw()))
    }

    async fn refresh(&mut self) -> Result<()> {
        let mut state = self.state();
        if !state.running {
            return Err(Error::Automation("no session".to_string()));
        }
        state.refreshes += 1;
        Ok(())
    }

    async fn main_process_logs(&mut self) -> Result<Vec<String>> {
        let mut state = self.state();
        state.log_reads += 1;
        if state.fail_logs {
            return Err(Error::Automation("log endpoint unavailable".to_string()));
        }
        Ok(std::mem::take(&mut state.main_logs))
    }

    async fn renderer_process_logs(&mut self) -> Result<Vec<LogEntry>> {
        let mut state = self.state();
        if state.fail_logs {
            return Err(Error::Automation("log endpoint unavailable".to_string()));
        }
        Ok(std::mem::take(&mut state.renderer_logs))
    }

    fn has_window(&self) -> bool {
        self.state().running
    }

    async fn capture_page(&mut self) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn set_local_storage(&mut self, key: &str, value: &str) -> Result<()> {
        self.state()
            .local_storage
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn local_storage(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.state().local_storage.get(key).cloned())
    }
}
