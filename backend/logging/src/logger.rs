//! Structured Logger
//!
//! Wraps `tracing` with a console layer and, when a log directory is given,
//! a daily rolling NDJSON file.

use std::path::Path;

use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix inside the log directory (`deskforge.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "deskforge.log";

const FALLBACK_LEVEL: &str = "info";

/// Parse an `EnvFilter` directive, falling back to `info` when it is invalid.
/// The second value is the rejected directive, if any.
pub fn build_filter(level: &str) -> (EnvFilter, Option<String>) {
    match EnvFilter::try_new(level) {
        Ok(filter) => (filter, None),
        Err(_) => (EnvFilter::new(FALLBACK_LEVEL), Some(level.to_string())),
    }
}

/// Initialize the global structured logger.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logger(log_dir: Option<&Path>, level: &str) {
    let (env_filter, rejected) = build_filter(level);

    let file_layer = log_dir.map(|dir| {
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
        fmt::layer()
            .json()
            .with_writer(file_appender)
            .with_ansi(false)
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Some(directive) = rejected {
        warn!(%directive, "Invalid log level directive, using {FALLBACK_LEVEL}");
    }
}
