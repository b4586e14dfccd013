//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and tracing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error, or a full directive)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "message-bus".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BUS_SERVICE_NAME`: Service name (default: message-bus)
    /// - `BUS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `BUS_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `BUS_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("BUS_SERVICE_NAME")
                .unwrap_or_else(|_| "message-bus".to_string()),

            log_level: env::var("BUS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("BUS_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("BUS_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(false),
        }
    }

    /// Configuration for a named service with everything else from the
    /// environment.
    pub fn for_service(service_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = service_name.to_string();
        config
    }
}

/// `true`/`1` and `false`/`0`, case-insensitive; anything else is `default`.
fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        _ => default,
    }
}
