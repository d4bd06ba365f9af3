//! Logging initialization and configuration.

use crate::config::LogFormat;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to install the log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Build the event filter.
///
/// `RUST_LOG` takes precedence over `level` when it is set, so selection
/// tracing can be enabled per module (`RUST_LOG=stickylb::sticky=debug`).
pub fn log_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(level).map_err(|source| LoggingError::InvalidFilter {
        filter: level.to_string(),
        source,
    })
}

/// Initialize the logging system.
///
/// Events go to stderr so that CLI output on stdout stays machine readable.
///
/// # Arguments
///
/// * `level` - Log level filter (e.g., "info", "stickylb::sticky=debug")
/// * `format` - Log output format
pub fn init_logging(level: &str, format: &LogFormat) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(log_filter(level)?);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}
