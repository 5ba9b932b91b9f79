//! Tracing configuration and log routing.
//!
//! Human-readable events go to stdout (compact, or JSON lines with `--log-json`) and are
//! appended to `agent.log` in the report folder through a non-blocking writer. `log` records
//! from the scanner and batch runner are bridged into the same subscriber.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::DocsortError;

pub const LOG_FILE_NAME: &str = "agent.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// `debug` instead of `info` when `RUST_LOG` is unset.
    pub verbose: bool,
    /// JSON lines on stdout.
    pub json: bool,
}

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Installs the global subscriber. Call once, before the first file is processed.
///
/// `report_folder` is created if needed. Without it only stdout logging is set up.
pub fn init_logging(report_folder: Option<&Path>, options: LogOptions) -> Result<(), DocsortError> {
    let stdout_json = options
        .json
        .then(|| fmt::layer().json().with_current_span(true));
    let stdout_compact = (!options.json).then(|| fmt::layer().with_target(false).compact());

    let file_layer = match report_folder {
        Some(folder) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(LOG_FILE_NAME)
                .build(folder)
                .map_err(|e| {
                    DocsortError::Logging(format!(
                        "cannot open {} in '{}': {}",
                        LOG_FILE_NAME,
                        folder.display(),
                        e
                    ))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(options.verbose))
        .with(stdout_json)
        .with(stdout_compact)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DocsortError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| DocsortError::Logging(e.to_string()))?;
    Ok(())
}
