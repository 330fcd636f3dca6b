//! Logging initialization.
//!
//! Installs a `tracing` subscriber with an environment-driven filter and
//! either human-readable or JSON output.

#[cfg(feature = "telemetry")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ConveyorResult;
use serde::{Deserialize, Serialize};

/// Default filter directive when neither `RUST_LOG` nor a configured level is set.
pub const DEFAULT_FILTER: &str = "info,conveyor=debug,tower_http=debug";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. `info` or `info,conveyor_jobs=trace`).
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: `pretty` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    DEFAULT_FILTER.to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl LoggingConfig {
    /// Returns true when JSON output was requested.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// returns an error instead of panicking.
#[cfg(feature = "telemetry")]
pub fn init_logging(config: &LoggingConfig) -> ConveyorResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = if config.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| crate::ConveyorError::Internal(format!("Failed to install logger: {}", e)))?;

    tracing::debug!(format = %config.format, "Logging initialized");
    Ok(())
}

/// Placeholder for when the telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_logging(_config: &LoggingConfig) -> ConveyorResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, DEFAULT_FILTER);
        assert!(!config.is_json());
    }

    #[test]
    fn test_json_format_detection() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "JSON".to_string(),
        };
        assert!(config.is_json());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.level, DEFAULT_FILTER);
        assert!(config.is_json());
    }
}
