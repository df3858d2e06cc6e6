//! Installation of the global `tracing` subscriber.

use crate::config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Failure installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directive does not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    Filter {
        /// Directive from configuration.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Builds the filter: `RUST_LOG` when set, the configured directive
/// otherwise.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the configured directive does
/// not parse.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|err| TelemetryError::Filter {
        filter: config.filter.clone(),
        reason: err.to_string(),
    })
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError`] for an invalid filter or when a subscriber is
/// already installed; nothing panics.
pub fn init(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{TelemetryError, init};
    use crate::config::LoggingConfig;
    use rstest::rstest;

    #[rstest]
    fn second_install_is_an_error_not_a_panic() {
        let config = LoggingConfig::default();
        let first = init(&config);
        let second = init(&config);
        assert!(first.is_ok() || matches!(first, Err(TelemetryError::AlreadyInstalled(_))));
        assert!(matches!(second, Err(TelemetryError::AlreadyInstalled(_))));
    }
}
