use std::path::Path;

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::consts::{DEFAULT_LOG_FILTER, LOG_ENV_VAR, LOG_FILE_PREFIX};

/// Keeps the non-blocking file writer flushing until the app exits.
pub(crate) struct LogGuard {
    _guard: WorkerGuard,
}

/// Installs the global subscriber: a daily rolling file in `log_dir`, plus
/// stderr in debug builds.
///
/// ```bash
/// CHATTIO_LOG=chattio_core=debug chattio
/// ```
pub(crate) fn init(log_dir: &Path) -> Result<LogGuard, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|error| format!("Failed to create log directory: {error}"))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let stderr_layer = cfg!(debug_assertions).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(fmt::time::ChronoLocal::new("%H:%M:%S%.3f".to_string()))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .with(stderr_layer)
        .try_init()
        .map_err(|error| format!("Failed to install log subscriber: {error}"))?;

    tracing::info!("═══════════════════════════════════════");
    tracing::info!(pid = std::process::id(), "chattio starting");
    tracing::info!(dir = %log_dir.display(), "log directory");
    tracing::info!("═══════════════════════════════════════");

    Ok(LogGuard { _guard: guard })
}
