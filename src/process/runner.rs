//! Spawning external processes and waiting for their first word
//!
//! `run` resolves as soon as the child's first stdout chunk has been
//! classified; the child keeps running afterwards and its handle is returned
//! to the caller. Stdin lines are written right after spawn without waiting
//! for the child's prompts, so callers must only use this with binaries whose
//! prompt order is fixed.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::common::{Error, Result};

use super::classifier::{FirstChunkClassifier, ReadinessSignal};

/// Upper bound for a single stdout read
const CHUNK_SIZE: usize = 64 * 1024;

/// What to spawn and how to judge it
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Lines written to stdin immediately after spawn, in order
    pub stdin: Vec<String>,
    pub classifier: FirstChunkClassifier,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, classifier: FirstChunkClassifier) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: Vec::new(),
            classifier,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn stdin_line(mut self, line: impl Into<String>) -> Self {
        self.stdin.push(line.into());
        self
    }

    /// Command line as it would be typed, for logs and errors
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// A child that reported ready
#[derive(Debug)]
pub struct Spawned {
    /// Text of the first stdout chunk
    pub output: String,
    pub handle: ProcessHandle,
}

impl Spawned {
    /// Parse the first chunk as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(self.output.trim()).map_err(|e| {
            Error::malformed_output(self.handle.command(), &self.output, e)
        })
    }
}

/// Owned reference to a running (or finished) child process
#[derive(Debug)]
pub struct ProcessHandle {
    command: String,
    pid: Option<u32>,
    child: Child,
    /// Held open so children reading stdin do not see EOF
    stdin: Option<ChildStdin>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit status if the child has already exited
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Stop the child: SIGTERM, then SIGKILL after `grace`
    ///
    /// Calling this on an exited child is a no-op.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        self.stdin.take();
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        tracing::info!(pid = ?self.pid, command = %self.command, "Terminating process");

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SAFETY: `pid` belongs to a child we spawned and have not reaped yet
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                return Ok(());
            }
            tracing::warn!(pid, "Process ignored SIGTERM, killing");
        }
        #[cfg(not(unix))]
        let _ = grace;

        match self.child.kill().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Spawn `spec` and wait until its first stdout chunk has been classified
pub async fn run(spec: ProcessSpec) -> Result<Spawned> {
    let command = spec.display();
    tracing::info!(command = %command, "Spawning process");

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ProcessSpawn {
            command: command.clone(),
            error: e.to_string(),
        })?;

    let pid = child.id();
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal(format!("No stdout pipe for '{}'", command)))?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(stderr));
    }

    let mut stdin = child.stdin.take();
    if let Some(pipe) = stdin.as_mut() {
        if let Err(e) = write_lines(pipe, &spec.stdin).await {
            // the child may exit before reading; its exit decides the outcome
            tracing::debug!(command = %command, "stdin write failed: {}", e);
        }
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    let read = tokio::select! {
        biased;
        read = stdout.read(&mut buf) => read?,
        status = child.wait() => {
            let status = status?;
            return Err(Error::ProcessExited { command, code: status.code() });
        }
    };

    if read == 0 {
        let status = child.wait().await?;
        return Err(Error::ProcessExited {
            command,
            code: status.code(),
        });
    }

    let chunk = String::from_utf8_lossy(&buf[..read]).into_owned();
    tracing::debug!(command = %command, "First output: {}", chunk.trim_end());
    tokio::spawn(drain_stdout(command.clone(), stdout));

    match spec.classifier.classify(&chunk) {
        ReadinessSignal::Ready(output) => Ok(Spawned {
            output,
            handle: ProcessHandle {
                command,
                pid,
                child,
                stdin,
            },
        }),
        ReadinessSignal::Failed(output) => {
            let _ = child.start_kill();
            Err(Error::ProcessFailed { command, output })
        }
        ReadinessSignal::Pending(output) => {
            drop(stdin);
            let status = child.wait().await?;
            if status.success() {
                Err(Error::UnexpectedOutput { command, output })
            } else {
                Err(Error::ProcessExited {
                    command,
                    code: status.code(),
                })
            }
        }
    }
}

async fn write_lines(pipe: &mut ChildStdin, lines: &[String]) -> std::io::Result<()> {
    for line in lines {
        pipe.write_all(line.as_bytes()).await?;
        pipe.write_all(b"\n").await?;
    }
    pipe.flush().await
}

/// Pass child stderr through to ours
async fn forward_stderr(stderr: ChildStderr) {
    let mut stderr = stderr;
    let _ = tokio::io::copy(&mut stderr, &mut tokio::io::stderr()).await;
}

/// Keep reading so a long-lived child never blocks on a full pipe
async fn drain_stdout(command: String, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!(command = %command, "{}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh", FirstChunkClassifier::with_markers(&["Failed", "Error"]))
            .arg("-c")
            .arg(script)
    }

    #[tokio::test]
    async fn test_resolves_with_parsed_payload() {
        let spawned = run(sh(r#"printf '{"ok":true}'"#)).await.unwrap();
        let payload: serde_json::Value = spawned.json().unwrap();
        assert_eq!(payload["ok"], true);
    }

    #[tokio::test]
    async fn test_rejects_on_failure_marker() {
        let err = run(sh("echo 'Error: bad state'; sleep 5")).await.unwrap_err();
        match err {
            Error::ProcessFailed { output, .. } => assert_eq!(output.trim(), "Error: bad state"),
            other => panic!("Expected ProcessFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_when_exiting_before_output() {
        let err = run(sh("exit 3")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited { code: Some(3), .. }));

        // a clean exit without output is still an early exit
        let err = run(sh("exit 0")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited { code: Some(0), .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = ProcessSpec::new(
            "/nonexistent/gaiad",
            FirstChunkClassifier::with_markers(&["Error"]),
        );
        assert!(matches!(run(spec).await, Err(Error::ProcessSpawn { .. })));
    }

    #[tokio::test]
    async fn test_stdin_lines_are_written_in_order() {
        let spawned = run(sh(r#"read a; read b; echo "$a-$b""#)
            .stdin_line("one")
            .stdin_line("two"))
        .await
        .unwrap();
        assert_eq!(spawned.output.trim(), "one-two");
    }

    #[tokio::test]
    async fn test_only_first_chunk_is_classified() {
        let mut spawned = run(sh("echo starting; sleep 0.3; echo 'Error: late'; exec sleep 30"))
            .await
            .unwrap();
        assert_eq!(spawned.output.trim(), "starting");
        spawned
            .handle
            .terminate(Duration::from_millis(500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pending_chunk_decided_by_exit() {
        let json = |script: &str| {
            ProcessSpec::new("sh", FirstChunkClassifier::json_object())
                .arg("-c")
                .arg(script)
        };

        let err = run(json("echo 'Enter passphrase:'; exit 2")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited { code: Some(2), .. }));

        let err = run(json("echo 'no json'")).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedOutput { .. }));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let mut spawned = run(sh("echo up; exec sleep 30")).await.unwrap();
        assert!(spawned.handle.pid().is_some());

        spawned.handle.terminate(Duration::from_millis(500)).await.unwrap();
        assert!(spawned.handle.try_status().unwrap().is_some());
        spawned.handle.terminate(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_json_keeps_raw_text() {
        let spawned = run(sh("echo '{not json'")).await.unwrap();
        let err = spawned.json::<serde_json::Value>().unwrap_err();
        match err {
            Error::MalformedOutput { output, .. } => assert!(output.contains("{not json")),
            other => panic!("Expected MalformedOutput, got {:?}", other),
        }
    }
}
