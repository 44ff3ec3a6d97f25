//! # Plugin Telemetry
//!
//! Logging and metrics for processes hosting the plugin event bus.
//!
//! ## Components
//!
//! - **Logs**: `tracing` subscriber with env-filter, pretty or JSON output
//! - **Metrics**: Prometheus counters and gauges for bus, config and registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plugin_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PLUGIN_SERVICE_NAME` | `plugin-host` | Service name attached to logs |
//! | `PLUGIN_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `PLUGIN_JSON_LOGS` | `false` | JSON log lines instead of pretty output |
//! | `PLUGIN_METRICS_ENABLED` | `true` | Register Prometheus metrics |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, COMPONENT_ERRORS,
    CONFIG_WRITES, EVENTS_DELIVERED, EVENTS_DUPLICATE, EVENTS_FAILED, EVENTS_PENDING,
    EVENTS_PUBLISHED, EVENTS_REJECTED, EVENT_PUBLISH_DURATION, PLUGINS_ACTIVE,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and register metrics.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };

    init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        metrics = config.metrics_enabled,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { _metrics: metrics })
}

/// Keeps telemetry alive. Dropping it logs shutdown.
pub struct TelemetryGuard {
    _metrics: Option<MetricsHandle>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
