//! Telemetry configuration.

use serde::{Deserialize, Serialize};

/// Telemetry configuration, usually sourced from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter, tracing env-filter syntax.
    pub log_level: String,
    /// Include event timestamps in log lines.
    pub with_timestamps: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            log_level: "info".to_string(),
            with_timestamps: true,
        }
    }
}

impl TelemetryConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = TelemetryConfig::default();
        if let Ok(level) = std::env::var("QRN_LOG_LEVEL") {
            config.log_level = level;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_is_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
    }
}
