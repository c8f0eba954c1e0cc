//! Logging setup for the host binary.
//!
//! Console output is filtered by `RUST_LOG`, falling back to the configured
//! level. When a debug log file is configured, warnings and errors are also
//! appended to it without ANSI colors.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let console = fmt::layer()
        .with_target(true)
        .with_filter(console_filter(&config.level)?);

    let debug_file = match &config.debug_log_file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(open_debug_log(path)?)
                .with_ansi(false)
                .with_filter(LevelFilter::WARN),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(debug_file)
        .try_init()
        .context("Failed to install the tracing subscriber")
}

fn console_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level)),
    }
}

/// Open the debug log for appending, creating parent directories.
///
/// The file never rotates, so every run appends to the same path.
fn open_debug_log(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Debug log path has no file name: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("Failed to open debug log file: {}", path.display()))
}
