//! Structured logging initialisation.
//!
//! Builds a `tracing-subscriber` registry from [`LoggingConfig`]: an env
//! filter (`RUST_LOG` wins over the configured level), an optional console
//! layer and an optional non-blocking file layer. Both layers can emit JSON.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// The returned guard must be held for the life of the process when file
/// logging is enabled; dropping it flushes and stops the background writer.
///
/// # Errors
/// Returns `ProtocolError::ConfigError` if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let console = config.log_to_console.then(|| {
        if config.json_format {
            fmt::layer().json().boxed()
        } else {
            fmt::layer().with_target(false).boxed()
        }
    });

    let mut guard = None;
    let file = match (config.log_to_file, config.log_file_path.as_deref()) {
        (true, Some(path)) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| ProtocolError::ConfigError("log_file_path has no file name".into()))?;
            let (writer, worker) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            guard = Some(worker);
            Some(if config.json_format {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_writer(writer).boxed()
            })
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialised");
    Ok(guard)
}
