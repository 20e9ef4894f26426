//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for agent logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error, or a full directive)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to include thread names in each log line
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "warden-agent".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            thread_names: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WARDEN_SERVICE_NAME`: Service name (default: warden-agent)
    /// - `WARDEN_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `WARDEN_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `WARDEN_THREAD_NAMES`: Include thread names (default: true)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("WARDEN_SERVICE_NAME")
                .unwrap_or_else(|_| "warden-agent".to_string()),

            log_level: env::var("WARDEN_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("WARDEN_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            thread_names: env::var("WARDEN_THREAD_NAMES")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }

    /// Override the level filter, e.g. from a command line flag.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
