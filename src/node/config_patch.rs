//! Shrinking consensus timeouts in the node's `config.toml`
//!
//! This is a line-oriented rewrite, not a TOML round trip: every line that is
//! not an allow-listed `key = <integer>` pair is written back untouched,
//! comments and formatting included. There is no backup; the config belongs
//! to an ephemeral test home.

use std::path::Path;

use crate::common::config::TimeoutPatch;
use crate::common::{Error, Result};

/// Rewrite the timeouts in `config_path` in place
pub fn reduce_timeouts(config_path: &Path, patch: &TimeoutPatch) -> Result<()> {
    let content = std::fs::read_to_string(config_path).map_err(|e| Error::FileRead {
        path: config_path.display().to_string(),
        error: e.to_string(),
    })?;
    let patched = patch_timeouts(&content, patch);
    std::fs::write(config_path, patched)?;
    tracing::info!(path = %config_path.display(), divisor = patch.divisor, "Reduced node timeouts");
    Ok(())
}

/// Apply `patch` to config text
pub fn patch_timeouts(content: &str, patch: &TimeoutPatch) -> String {
    content
        .split('\n')
        .map(|line| patch_line(line, patch).unwrap_or_else(|| line.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn patch_line(line: &str, patch: &TimeoutPatch) -> Option<String> {
    if patch.divisor == 0 {
        return None;
    }
    let (key, value) = line.split_once(" = ")?;
    if !patch.keys.iter().any(|k| k == key) {
        return None;
    }
    let number = leading_integer(value)?;
    let line_end = if line.ends_with('\r') { "\r" } else { "" };
    Some(format!("{} = {}{}", key, number / patch.divisor, line_end))
}

/// Integer prefix of `value`, skipping leading whitespace
fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let digits_start = usize::from(value.starts_with(['-', '+']));
    let digits_len = value[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    value[..digits_start + digits_len].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "# This is a TOML config file.\n\
proxy_app = \"tcp://127.0.0.1:26658\"\n\
\n\
[consensus]\n\
timeout_propose = 3000\n\
timeout_propose_delta = 500\n\
timeout_commit = 1000\n\
skip_timeout_commit = false\n\
flush_throttle_timeout = 100\n";

    #[test]
    fn test_timeout_commit_divided() {
        let patched = patch_timeouts("timeout_commit = 1000", &TimeoutPatch::default());
        assert_eq!(patched, "timeout_commit = 20");
    }

    #[test]
    fn test_unrelated_lines_byte_identical() {
        let patched = patch_timeouts(CONFIG, &TimeoutPatch::default());
        let lines: Vec<&str> = patched.split('\n').collect();
        assert_eq!(lines[0], "# This is a TOML config file.");
        assert_eq!(lines[1], "proxy_app = \"tcp://127.0.0.1:26658\"");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "[consensus]");
        assert_eq!(lines[4], "timeout_propose = 60");
        assert_eq!(lines[5], "timeout_propose_delta = 10");
        assert_eq!(lines[6], "timeout_commit = 20");
        assert_eq!(lines[7], "skip_timeout_commit = false");
        assert_eq!(lines[8], "flush_throttle_timeout = 2");
        // trailing newline survives
        assert!(patched.ends_with('\n'));
    }

    #[test]
    fn test_integer_division_truncates() {
        let patched = patch_timeouts("timeout_prevote = 99", &TimeoutPatch::default());
        assert_eq!(patched, "timeout_prevote = 1");
        let patched = patch_timeouts("timeout_prevote = 49", &TimeoutPatch::default());
        assert_eq!(patched, "timeout_prevote = 0");
    }

    #[test]
    fn test_non_integer_and_odd_shapes_untouched() {
        let patch = TimeoutPatch::default();
        for line in [
            "timeout_commit = \"1s\"",
            "timeout_commit=1000",
            "  timeout_commit = 1000",
            "timeout_commit = ",
            "moniker = Error",
        ] {
            assert_eq!(patch_timeouts(line, &patch), line);
        }
    }

    #[test]
    fn test_crlf_line_endings_preserved() {
        let patched = patch_timeouts("timeout_commit = 1000\r\nmoniker = \"x\"\r\n", &TimeoutPatch::default());
        assert_eq!(patched, "timeout_commit = 20\r\nmoniker = \"x\"\r\n");
    }

    #[test]
    fn test_configurable_divisor_and_keys() {
        let patch = TimeoutPatch {
            keys: vec!["peer_gossip_sleep_duration".to_string()],
            divisor: 10,
        };
        let patched = patch_timeouts("peer_gossip_sleep_duration = 100\ntimeout_commit = 1000", &patch);
        assert_eq!(patched, "peer_gossip_sleep_duration = 10\ntimeout_commit = 1000");
    }

    #[test]
    fn test_reduce_timeouts_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, CONFIG).unwrap();

        reduce_timeouts(&path, &TimeoutPatch::default()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("timeout_commit = 20\n"));
        assert!(content.contains("proxy_app = \"tcp://127.0.0.1:26658\"\n"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = reduce_timeouts(&dir.path().join("missing.toml"), &TimeoutPatch::default())
            .unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
