//! # Sim Telemetry
//!
//! Observability bootstrap for simulation runs.
//!
//! ## Components
//!
//! - Structured logging through `tracing`, with an env-filtered fmt
//!   subscriber.
//! - Counters reporting: labeled JSON snapshots of per-subsystem counters
//!   at the end of a run.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QRN_LOG_LEVEL` | `info` | Log level filter (tracing env-filter syntax) |

mod config;
mod logging;
mod report;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use report::ReportBuilder;

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
