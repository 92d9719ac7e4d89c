//! WebDriver automation client
//!
//! Spawns a chromedriver-compatible server per start, opens a session whose
//! browser binary is the GUI runtime, and drives it over the W3C WebDriver
//! HTTP protocol. Everything the driver process tree prints is kept as the
//! main process log.

use std::net::TcpListener;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::common::{Error, Result};

use super::automation::{AppLaunch, AutomationClient, LogEntry, Selector};

const EXISTS_SCRIPT: &str = "const [css, text] = arguments; \
return Array.from(document.querySelectorAll(css)).some(\
el => text === null || el.textContent.trim() === text);";

const SET_ITEM_SCRIPT: &str = "localStorage.setItem(arguments[0], arguments[1]);";

const GET_ITEM_SCRIPT: &str = "return localStorage.getItem(arguments[0]);";

/// Upper bound for a single WebDriver round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type LogBuffer = Arc<Mutex<Vec<String>>>;

/// Running driver server plus the session opened on it
struct Session {
    driver: Child,
    base_url: String,
    id: String,
}

/// Automation over WebDriver
pub struct WebDriverClient {
    http: reqwest::Client,
    session: Option<Session>,
    main_logs: LogBuffer,
}

impl WebDriverClient {
    pub fn new() -> Result<Self> {
        // a hung driver must not stall a bounded wait
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            session: None,
            main_logs: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Automation("no active session".to_string()))
    }

    /// Send a session command and return its `value`
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let session = self.session()?;
        let url = format!("{}/session/{}{}", session.base_url, session.id, path);
        send(&self.http, method, &url, body).await
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn wait_for_driver(&self, base_url: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let status_url = format!("{}/status", base_url);
        while start.elapsed() < timeout {
            match send(&self.http, Method::GET, &status_url, None).await {
                Ok(value) if value["ready"].as_bool().unwrap_or(true) => return Ok(()),
                Ok(_) => tracing::debug!("Driver not ready yet"),
                // connection refused is expected while the driver starts
                Err(_) => {}
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Err(Error::Automation(format!(
            "driver did not become ready within {} seconds",
            timeout.as_secs()
        )))
    }
}

#[async_trait]
impl AutomationClient for WebDriverClient {
    async fn start(&mut self, launch: &AppLaunch) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::Automation("session already running".to_string()));
        }

        let port = free_port()?;
        let base_url = format!("http://127.0.0.1:{}", port);
        tracing::info!(driver = %launch.driver_binary.display(), port, "Spawning automation driver");

        let mut driver = Command::new(&launch.driver_binary)
            .arg(format!("--port={}", port))
            .envs(&launch.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ProcessSpawn {
                command: launch.driver_binary.display().to_string(),
                error: e.to_string(),
            })?;
        if let Some(stdout) = driver.stdout.take() {
            tokio::spawn(collect_lines(stdout, self.main_logs.clone()));
        }
        if let Some(stderr) = driver.stderr.take() {
            tokio::spawn(collect_lines(stderr, self.main_logs.clone()));
        }

        if let Err(e) = self.wait_for_driver(&base_url, launch.start_timeout).await {
            let _ = driver.kill().await;
            return Err(e);
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": {
                        "binary": launch.app_binary.display().to_string(),
                        "args": launch.args,
                    }
                }
            }
        });
        let created = tokio::time::timeout(
            launch.start_timeout,
            send(
                &self.http,
                Method::POST,
                &format!("{}/session", base_url),
                Some(capabilities),
            ),
        )
        .await
        .map_err(|_| Error::Automation("timed out creating session".to_string()))
        .and_then(|r| r);

        let id = match created.and_then(|value| {
            value["sessionId"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::Automation(format!("no sessionId in {}", value)))
        }) {
            Ok(id) => id,
            Err(e) => {
                let _ = driver.kill().await;
                return Err(e);
            }
        };

        tracing::info!(session = %id, "Automation session started");
        self.session = Some(Session {
            driver,
            base_url,
            id,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let url = format!("{}/session/{}", session.base_url, session.id);
        if let Err(e) = send(&self.http, Method::DELETE, &url, None).await {
            tracing::warn!("Closing session failed: {}", e);
        }
        if let Err(e) = session.driver.kill().await {
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.session.is_some()
    }

    async fn exists(&mut self, selector: &Selector) -> Result<bool> {
        let value = self
            .execute(EXISTS_SCRIPT, json!([selector.css(), selector.text()]))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn refresh(&mut self) -> Result<()> {
        self.command(Method::POST, "/refresh", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn main_process_logs(&mut self) -> Result<Vec<String>> {
        let mut logs = self
            .main_logs
            .lock()
            .map_err(|_| Error::Internal("main log buffer poisoned".to_string()))?;
        Ok(std::mem::take(&mut *logs))
    }

    async fn renderer_process_logs(&mut self) -> Result<Vec<LogEntry>> {
        let value = self
            .command(Method::POST, "/se/log", Some(json!({ "type": "browser" })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    fn has_window(&self) -> bool {
        self.session.is_some()
    }

    async fn capture_page(&mut self) -> Result<Vec<u8>> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::Automation("screenshot is not a string".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Automation(format!("invalid screenshot data: {}", e)))
    }

    async fn set_local_storage(&mut self, key: &str, value: &str) -> Result<()> {
        self.execute(SET_ITEM_SCRIPT, json!([key, value]))
            .await
            .map(|_| ())
    }

    async fn local_storage(&mut self, key: &str) -> Result<Option<String>> {
        let value = self.execute(GET_ITEM_SCRIPT, json!([key])).await?;
        Ok(value.as_str().map(str::to_string))
    }
}

/// Send a WebDriver request, unwrapping `value` or the protocol error
async fn send(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(Error::Automation(webdriver_error(&value)));
    }
    Ok(value)
}

fn webdriver_error(value: &Value) -> String {
    let error = value["error"].as_str().unwrap_or("unknown error");
    match value["message"].as_str() {
        Some(message) => format!("{}: {}", error, message),
        None => error.to_string(),
    }
}

/// Find a free port to use
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

async fn collect_lines<R: AsyncRead + Unpin>(reader: R, buffer: LogBuffer) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Ok(mut buffer) = buffer.lock() {
            buffer.push(line);
        }
    }
}
