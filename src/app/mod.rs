//! The GUI under test
//!
//! [`AppDriver`] owns the lifecycle, [`AutomationClient`] is the remote
//! control it drives. [`WebDriverClient`] talks to a real GUI and
//! [`InMemoryClient`] stands in for one in tests.

pub mod automation;
mod driver;
pub mod logs;
pub mod memory;
mod webdriver;

pub use automation::{AppLaunch, AutomationClient, LogEntry, Selector};
pub use driver::{AppDriver, AppState};
pub use memory::{InMemoryClient, InMemoryState};
pub use webdriver::WebDriverClient;
