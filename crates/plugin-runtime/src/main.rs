//! # Plugin Runtime
//!
//! Runs the demonstration plugin host.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (`PLUGIN_LOG_LEVEL`, `PLUGIN_JSON_LOGS`, ...)
//! 2. Load and validate `PLUGIN_*` runtime configuration
//! 3. Register demo schemas, configs and plugins
//! 4. Start the runtime (bus, background tasks, plugin activation)
//! 5. Run the demo until it finishes or Ctrl+C arrives
//! 6. Shut down in reverse order

use anyhow::{Context, Result};
use plugin_runtime::{demo, PluginRuntime, RuntimeConfig};
use plugin_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let metrics_enabled = telemetry.metrics_enabled;
    let _guard = init_telemetry(telemetry).context("failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env();
    let runtime = PluginRuntime::new(config)?;

    let audit = demo::install(&runtime).await?;
    runtime.start().await?;

    tokio::select! {
        result = demo::run(&runtime) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            warn!("Interrupted, shutting down");
        }
    }

    info!(events_seen = audit.seen(), "Audit plugin summary");

    runtime.shutdown().await?;

    if metrics_enabled {
        info!("Final metrics:\n{}", encode_metrics()?);
    }

    Ok(())
}
