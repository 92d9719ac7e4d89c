//! Collecting GUI logs into the artifact directory or onto the console

use std::io::Write;
use std::path::Path;

use crate::common::paths::ArtifactPaths;
use crate::common::Result;

use super::automation::{AutomationClient, LogEntry};

/// Renderer output is echoed into the main process log with this prefix
const RENDERER_ECHO: &str = "CONSOLE(";

/// Main process lines without the renderer echo
pub fn main_process_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .filter(|line| !line.contains(RENDERER_ECHO))
        .collect()
}

/// Append both logs to the artifact directory
///
/// The logs are drained from the client, so this must run before the GUI
/// is stopped or their contents are lost.
pub async fn write_logs(client: &mut dyn AutomationClient, paths: &ArtifactPaths) -> Result<()> {
    let main = main_process_lines(client.main_process_logs().await?);
    let renderer = client.renderer_process_logs().await?;

    append(&paths.main_process_log(), &main)?;
    append(
        &paths.renderer_process_log(),
        &renderer.iter().map(|e| e.message.clone()).collect::<Vec<_>>(),
    )?;

    tracing::info!(path = %paths.main_process_log().display(), "Wrote main process log");
    tracing::info!(path = %paths.renderer_process_log().display(), "Wrote renderer process log");
    Ok(())
}

/// Print both logs to stdout
pub async fn print_logs(client: &mut dyn AutomationClient) -> Result<()> {
    for line in main_process_lines(client.main_process_logs().await?) {
        println!("{}", line);
    }
    for entry in client.renderer_process_logs().await? {
        println!("{}", renderer_message(&entry));
    }
    Ok(())
}

/// Renderer messages arrive with escaped newlines
fn renderer_message(entry: &LogEntry) -> String {
    entry.message.replace("\\n", "\n")
}

fn append(path: &Path, lines: &[String]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    if !lines.is_empty() {
        writeln!(file, "{}", lines.join("\n"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::memory::InMemoryClient;

    #[test]
    fn test_renderer_echo_filtered() {
        let lines = vec![
            "[main] starting".to_string(),
            "[1234:CONSOLE(12)] \"hello\", source: app.js".to_string(),
            "[main] ready".to_string(),
        ];
        assert_eq!(main_process_lines(lines), ["[main] starting", "[main] ready"]);
    }

    #[test]
    fn test_renderer_message_unescapes_newlines() {
        let entry = LogEntry {
            level: "INFO".to_string(),
            message: "line one\\nline two".to_string(),
        };
        assert_eq!(renderer_message(&entry), "line one\nline two");
    }

    #[tokio::test]
    async fn test_write_logs_appends_and_drains() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let mut client = InMemoryClient::new();
        {
            let mut state = client.state();
            state.main_logs = vec!["boot".to_string(), "x CONSOLE(1) y".to_string()];
            state.renderer_logs = vec![LogEntry {
                level: "INFO".to_string(),
                message: "rendered".to_string(),
            }];
        }

        write_logs(&mut client, &paths).await.unwrap();
        client.state().main_logs.push("second".to_string());
        write_logs(&mut client, &paths).await.unwrap();

        let main = std::fs::read_to_string(paths.main_process_log()).unwrap();
        assert_eq!(main, "boot\nsecond\n");
        let renderer = std::fs::read_to_string(paths.renderer_process_log()).unwrap();
        assert_eq!(renderer, "rendered\n");
    }
}
