//! Logging and tracing configuration
//!
//! The harness always logs to stderr. When an artifact directory is known the
//! same events are also written to `<artifacts>/harness.log`, so a CI upload
//! carries the orchestrator's view next to the app logs.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name of the harness log inside the artifact directory
pub const HARNESS_LOG: &str = "harness.log";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("harness=info,warn"))
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing to stderr and to `<artifacts>/harness.log`
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the whole run. Falls back to stderr only if the directory is unusable.
pub fn init_with_file(artifacts: &Path) -> Option<WorkerGuard> {
    if let Err(e) = std::fs::create_dir_all(artifacts) {
        eprintln!("Warning: Could not create artifact directory: {}", e);
        init_cli();
        return None;
    }

    let appender = tracing_appender::rolling::never(artifacts, HARNESS_LOG);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Some(guard)
}
