//! Structured logging to the terminal and, optionally, a rotating log file

use crate::config::Logging;
use anyhow::{anyhow, Result};
use std::io::IsTerminal;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs the global subscriber.
///
/// The returned guard flushes the log file on drop; keep it alive for the life of the process.
pub fn init(cfg: &Logging) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .map_err(|e| anyhow!("Invalid log level `{}`: {}", cfg.level, e))?;

    // Only print colors when printing to a terminal
    let ansi = std::io::stdout().is_terminal();
    let stdout_layer = if cfg.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().with_ansi(ansi).boxed()
    };

    let (file_layer, guard) = match &cfg.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or(anyhow!("Log file `{}` has no file name", path.to_string_lossy()))?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Could not install log subscriber: {}", e))?;

    Ok(guard)
}

/// Something Discord told us about
#[macro_export]
macro_rules! log_event {
    ($($args:tt)+) => {{
        ::tracing::info!(target: "event", $($args)+)
    }};
}

/// Something the bot did on its own
#[macro_export]
macro_rules! log_internal {
    ($($args:tt)+) => {{
        ::tracing::info!(target: "internal", $($args)+)
    }};
}
