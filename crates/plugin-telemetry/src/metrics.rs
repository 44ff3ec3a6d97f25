//! Prometheus metrics for plugin hosts.
//!
//! All metrics follow the naming convention: `plugin_<component>_<metric>_<unit>`
//!
//! Bus counters are mirrored from `BusStats` snapshots by the host, so they
//! are `IntCounter`s advanced by deltas rather than incremented inline.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS
    // =========================================================================

    pub static ref EVENTS_PUBLISHED: IntCounter = IntCounter::new(
        "plugin_bus_events_published_total",
        "Events passed to publish"
    ).expect("metric creation failed");

    pub static ref EVENTS_DELIVERED: IntCounter = IntCounter::new(
        "plugin_bus_events_delivered_total",
        "Events routed to every subscriber without failure"
    ).expect("metric creation failed");

    pub static ref EVENTS_FAILED: IntCounter = IntCounter::new(
        "plugin_bus_events_failed_total",
        "Events with at least one failed handler"
    ).expect("metric creation failed");

    pub static ref EVENTS_DUPLICATE: IntCounter = IntCounter::new(
        "plugin_bus_events_duplicate_total",
        "Events dropped as already processed"
    ).expect("metric creation failed");

    pub static ref EVENTS_REJECTED: IntCounter = IntCounter::new(
        "plugin_bus_events_rejected_total",
        "Events rejected by validation"
    ).expect("metric creation failed");

    /// Events waiting in the batch queue
    pub static ref EVENTS_PENDING: IntGauge = IntGauge::new(
        "plugin_bus_events_pending",
        "Events queued for the next batch flush"
    ).expect("metric creation failed");

    /// Host-side publish latency, routing included in immediate mode
    pub static ref EVENT_PUBLISH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "plugin_bus_publish_duration_seconds",
            "Time for one publish call to return"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("metric creation failed");

    // =========================================================================
    // CONFIG AND REGISTRY
    // =========================================================================

    /// Config writes by outcome (accepted/rejected)
    pub static ref CONFIG_WRITES: IntCounterVec = IntCounterVec::new(
        Opts::new("plugin_config_writes_total", "Configuration writes by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    pub static ref PLUGINS_ACTIVE: IntGauge = IntGauge::new(
        "plugin_registry_plugins_active",
        "Plugins currently active"
    ).expect("metric creation failed");

    // =========================================================================
    // ERRORS
    // =========================================================================

    /// Failed calls by component and error kind
    pub static ref COMPONENT_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("plugin_component_errors_total", "Errors by component and type"),
        &["component", "error_type"]
    ).expect("metric creation failed");
}

/// Keeps the registry reachable for the process lifetime.
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event bus
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_DELIVERED.clone()),
        Box::new(EVENTS_FAILED.clone()),
        Box::new(EVENTS_DUPLICATE.clone()),
        Box::new(EVENTS_REJECTED.clone()),
        Box::new(EVENTS_PENDING.clone()),
        Box::new(EVENT_PUBLISH_DURATION.clone()),
        // Config / registry
        Box::new(CONFIG_WRITES.clone()),
        Box::new(PLUGINS_ACTIVE.clone()),
        // Errors
        Box::new(COMPONENT_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes elapsed seconds into a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
