//! Mirrors component counters into Prometheus.
//!
//! The bus and config manager keep their own atomic counters. A periodic task
//! snapshots them and advances the Prometheus counters by the difference since
//! the previous snapshot.
//!
//! Publish latency and error kinds are not in `BusStats`, so host-side
//! publishes go through [`InstrumentedPublisher`], which records them inline.

use async_trait::async_trait;
use plugin_bus::{BusStats, EventBus, EventPublisher, PublishOutcome};
use plugin_config::{ConfigManager, ConfigStats};
use plugin_registry::PluginRegistry;
use plugin_telemetry::{
    time_histogram, COMPONENT_ERRORS, CONFIG_WRITES, EVENTS_DELIVERED, EVENTS_DUPLICATE,
    EVENTS_FAILED, EVENTS_PENDING, EVENTS_PUBLISHED, EVENTS_REJECTED, EVENT_PUBLISH_DURATION,
    PLUGINS_ACTIVE,
};
use plugin_types::{Event, EventError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Last snapshot pushed to Prometheus.
#[derive(Debug, Default)]
pub struct MetricsMirror {
    bus: BusStats,
    config: ConfigStats,
}

impl MetricsMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the change since the last call.
    pub fn record(&mut self, bus: BusStats, config: ConfigStats, pending: usize, active: usize) {
        EVENTS_PUBLISHED.inc_by(bus.published.saturating_sub(self.bus.published));
        EVENTS_DELIVERED.inc_by(bus.delivered.saturating_sub(self.bus.delivered));
        EVENTS_FAILED.inc_by(bus.failed.saturating_sub(self.bus.failed));
        EVENTS_DUPLICATE.inc_by(bus.duplicates.saturating_sub(self.bus.duplicates));
        EVENTS_REJECTED.inc_by(bus.rejected.saturating_sub(self.bus.rejected));

        CONFIG_WRITES
            .with_label_values(&["accepted"])
            .inc_by(config.writes.saturating_sub(self.config.writes));
        CONFIG_WRITES
            .with_label_values(&["rejected"])
            .inc_by(config.rejected.saturating_sub(self.config.rejected));

        EVENTS_PENDING.set(pending as i64);
        PLUGINS_ACTIVE.set(active as i64);

        self.bus = bus;
        self.config = config;
    }
}

/// [`EventPublisher`] over the bus that times every call and counts failures
/// by kind.
pub struct InstrumentedPublisher {
    bus: Arc<EventBus>,
}

impl InstrumentedPublisher {
    pub const COMPONENT: &'static str = "event-bus";

    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl EventPublisher for InstrumentedPublisher {
    async fn publish(&self, event: Event) -> Result<PublishOutcome, EventError> {
        let _timer = time_histogram!(EVENT_PUBLISH_DURATION);
        let result = self.bus.publish(event).await;
        if let Err(e) = &result {
            COMPONENT_ERRORS
                .with_label_values(&[Self::COMPONENT, error_kind(e)])
                .inc();
        }
        result
    }

    fn events_published(&self) -> u64 {
        self.bus.events_published()
    }
}

/// Label value for an error's variant.
fn error_kind(error: &EventError) -> &'static str {
    match error {
        EventError::Validation(_) => "validation",
        EventError::Delivery { .. } => "delivery",
        EventError::Handler(_) => "handler",
        EventError::Subscription { .. } => "subscription",
        EventError::Timeout { .. } => "timeout",
        EventError::Channel(_) => "channel",
        EventError::State { .. } => "state",
        EventError::Batch(_) => "batch",
        EventError::Compression(_) => "compression",
    }
}

/// Run until `shutdown` flips to `true` or its sender is dropped, then
/// mirror one last time.
pub(crate) async fn run_monitor(
    bus: Arc<EventBus>,
    configs: Arc<ConfigManager>,
    registry: Arc<PluginRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut mirror = MetricsMirror::new();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mirror_now = |mirror: &mut MetricsMirror| {
        let stats = bus.stats();
        mirror.record(stats, configs.stats(), bus.pending(), registry.active_count());
        debug!(
            published = stats.published,
            delivered = stats.delivered,
            failed = stats.failed,
            "Metrics mirrored"
        );
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => mirror_now(&mut mirror),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Final snapshot so totals include the last interval
    mirror_now(&mut mirror);
    debug!("Metrics monitor stopped");
}
