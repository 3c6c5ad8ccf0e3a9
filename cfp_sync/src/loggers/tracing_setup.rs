//! # Tracing Setup
//!
//! Installs the process-wide subscriber: an `EnvFilter` (from `RUST_LOG`, or
//! the configured level), a console layer, and optionally a JSON file layer
//! rolled daily and written through a non-blocking appender.

use std::path::Path;

use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{SyncError, SyncResult};

/// Installs the subscriber. Keep the returned guard alive for as long as file
/// logging is needed; dropping it flushes and stops the writer thread.
///
/// A second call in the same process is a no-op and returns `Ok(None)`.
pub fn init_tracing(level: &str, log_dir: Option<&Path>, file_prefix: &str) -> SyncResult<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| SyncError::Config(format!("invalid log level {level:?}: {e}")))?;

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let mut guard = None;
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let (writer, worker_guard) = non_blocking(rolling::daily(dir, file_prefix));
            guard = Some(worker_guard);
            Some(fmt::layer().with_ansi(false).with_writer(writer).json())
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => {
            info!(level, log_dir = ?log_dir, "logging initialized");
            Ok(guard)
        }
        Err(e) => {
            debug!(error = %e, "a global subscriber is already installed");
            Ok(None)
        }
    }
}
