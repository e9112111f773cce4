use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::DomainError;

fn default_filter(level: &str) -> String {
    format!("pronscore={},warn", level)
}

/// Initialize logging: console output on stderr, plus daily-rotated JSON files when enabled.
///
/// Returns a guard that must be kept alive for the duration of the application.
/// When the guard is dropped, any remaining logs are flushed.
pub fn init_logging(
    logs_dir: &Path,
    level: &str,
    file_logging: bool,
    max_files: u32,
) -> Result<Option<WorkerGuard>, DomainError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    // Stdout is reserved for command output.
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(env_filter);

    if !file_logging {
        let _ = tracing_subscriber::registry().with(console_layer).try_init();
        tracing::debug!(level = level, "Logging initialized (console only)");
        return Ok(None);
    }

    fs::create_dir_all(logs_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pronscore")
        .filename_suffix("log")
        .max_log_files(max_files.max(1) as usize)
        .build(logs_dir)
        .map_err(|e| DomainError::Config(format!("Failed to create log appender: {}", e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Span close events carry per-run timing in the JSON log.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(EnvFilter::new(format!("pronscore={}", level)));

    if tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(
            logs_dir = ?logs_dir,
            level = level,
            "Logging initialized with file output"
        );
    }

    Ok(Some(guard))
}
