//! Telemetry configuration from environment variables.

use std::env;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Filter directive (trace, debug, info, warn, error or full env-filter syntax)
    pub log_level: String,

    /// JSON log lines for log shippers
    pub json_logs: bool,

    /// Include file and line in log output
    pub source_location: bool,

    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "plugin-host".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            source_location: false,
            metrics_enabled: true,
        }
    }
}

fn flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl TelemetryConfig {
    /// Read `PLUGIN_*` variables, falling back to defaults.
    ///
    /// JSON logs default to on inside containers (`KUBERNETES_SERVICE_HOST`
    /// or `DOCKER_CONTAINER` set).
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        Self {
            service_name: env::var("PLUGIN_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("PLUGIN_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: flag("PLUGIN_JSON_LOGS").unwrap_or(is_container),

            source_location: flag("PLUGIN_LOG_SOURCE").unwrap_or(defaults.source_location),

            metrics_enabled: flag("PLUGIN_METRICS_ENABLED").unwrap_or(defaults.metrics_enabled),
        }
    }
}
