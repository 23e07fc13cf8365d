//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Initialize the global tracing subscriber.
///
/// Returns an error when the filter directive is malformed; calling twice is
/// reported as an initialization failure by the subscriber.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|err| TelemetryError::Config(err.to_string()))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if config.with_timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    result.map_err(|err| TelemetryError::LoggingInit(err.to_string()))
}
