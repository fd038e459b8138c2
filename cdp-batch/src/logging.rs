//! Tracing setup for the CLI: colored console output plus a per-run log file.
//!
//! The file layer writes through `tracing_appender::non_blocking`. Its [`WorkerGuard`] is
//! returned to the caller, which must hold it for the whole run: dropping it flushes every
//! buffered line to disk, on success and error paths alike.

use std::path::Path;

use anyhow::{Context, Result};
use cdp_batch_core::artifacts::RunTimestamp;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console default when `RUST_LOG` is unset.
const CONSOLE_DEFAULT_FILTER: &str = "info";

/// The log file records everything from our crates at debug, dependencies at info.
const FILE_FILTER: &str = "info,cdp_batch=debug,cdp_batch_core=debug";

pub fn log_file_name(timestamp: &RunTimestamp) -> String {
    format!("batch-importer-{timestamp}.log")
}

/// Install the global subscriber. Keep the returned guard alive until the process ends.
pub fn init_logging(log_dir: &Path, timestamp: &RunTimestamp) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file_name(timestamp));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(CONSOLE_DEFAULT_FILTER));
    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
