//! Tracing setup
//!
//! Console logs go to stderr so stdout stays clean for tables and `--json`.
//! `RUST_LOG` overrides the default `apbatch=info` filter and
//! `APBATCH_LOG_FORMAT` overrides the configured format.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "apbatch=info";
const LOG_FILE_PREFIX: &str = "apbatch.log";

/// Install the global subscriber; keep the guard alive until exit so the
/// file writer flushes
pub fn init(configured_format: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let format = std::env::var("APBATCH_LOG_FORMAT").unwrap_or_else(|_| configured_format.to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let console = match format.as_str() {
        // Production: JSON structured logging
        "json" => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        // Development: Pretty formatting with colors
        _ => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
