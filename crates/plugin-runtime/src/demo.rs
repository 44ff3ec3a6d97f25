//! Demonstration plugins and the scripted lifecycle the binary runs.

use crate::PluginRuntime;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use plugin_bus::{handler_fn, EventBus, EventPublisher, PublishOutcome, Subscription};
use plugin_config::ConfigManager;
use plugin_registry::{Plugin, PluginError};
use plugin_types::{ConfigSchema, Event, FieldSchema, FieldType, PluginConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub const AUDIT_PLUGIN: &str = "audit";
pub const GREETER_PLUGIN: &str = "greeter";

/// Counts every event on the channels it watches.
pub struct AuditPlugin {
    bus: Arc<EventBus>,
    channels: Vec<String>,
    seen: Arc<AtomicU64>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AuditPlugin {
    pub fn new(bus: Arc<EventBus>, channels: Vec<String>) -> Self {
        Self {
            bus,
            channels,
            seen: Arc::new(AtomicU64::new(0)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Plugin for AuditPlugin {
    fn name(&self) -> &str {
        AUDIT_PLUGIN
    }

    async fn activate(&self) -> Result<(), PluginError> {
        let mut subscriptions = self.subscriptions.lock();
        for channel in &self.channels {
            let seen = self.seen.clone();
            let handler = handler_fn(move |event: Arc<Event>| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::Relaxed);
                    info!(channel = %event.channel, event_type = %event.event_type, "[audit] event");
                    Ok(())
                }
            });
            let subscription = self
                .bus
                .subscribe(channel, handler)
                .map_err(|e| PluginError::new(e.to_string()))?;
            subscriptions.push(subscription);
        }
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), PluginError> {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        Ok(())
    }
}

/// Announces itself with its configured greeting once active.
pub struct GreeterPlugin {
    publisher: Arc<dyn EventPublisher>,
    configs: Arc<ConfigManager>,
}

impl GreeterPlugin {
    pub fn new(publisher: Arc<dyn EventPublisher>, configs: Arc<ConfigManager>) -> Self {
        Self { publisher, configs }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "greeting",
                FieldSchema::new(FieldType::String).default_value(json!("hello")),
            )
            .field(
                "audience",
                FieldSchema::new(FieldType::String)
                    .allowed(vec![json!("world"), json!("plugins")])
                    .default_value(json!("world")),
            )
            .field(
                "api_token",
                FieldSchema::new(FieldType::String)
                    .sensitive()
                    .description("Token for the greeting service"),
            )
    }
}

#[async_trait]
impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        GREETER_PLUGIN
    }

    fn dependencies(&self) -> Vec<String> {
        vec![AUDIT_PLUGIN.to_string()]
    }

    async fn activate(&self) -> Result<(), PluginError> {
        let config = self
            .configs
            .get_config(GREETER_PLUGIN)
            .map_err(|e| PluginError::new(e.to_string()))?;
        let greeting = config.get("greeting").and_then(Value::as_str).unwrap_or("hello");
        let audience = config.get("audience").and_then(Value::as_str).unwrap_or("world");

        let event = Event::builder("PLUGIN.ACTIVATED", "plugins")
            .source(GREETER_PLUGIN)
            .data(json!({ "message": format!("{}, {}", greeting, audience) }))
            .build();
        self.publisher
            .publish(event)
            .await
            .map_err(|e| PluginError::new(e.to_string()))?;
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

fn config_of(value: Value) -> PluginConfig {
    match value {
        Value::Object(map) => map,
        _ => PluginConfig::new(),
    }
}

/// Register schemas, seed config and register the demo plugins.
///
/// Returns the audit plugin so callers can inspect its counter.
pub async fn install(runtime: &PluginRuntime) -> Result<Arc<AuditPlugin>> {
    runtime
        .configs()
        .register_schema(GREETER_PLUGIN, GreeterPlugin::schema());

    let result = runtime
        .configs()
        .set_config(
            GREETER_PLUGIN,
            config_of(json!({ "greeting": "hi", "api_token": "demo-token" })),
        )
        .await;
    if !result.is_valid {
        anyhow::bail!("demo config rejected: {:?}", result.errors);
    }

    let mut channels = runtime.config().channels.clone();
    channels.push(crate::CONFIG_CHANNEL.to_string());
    let audit = Arc::new(AuditPlugin::new(runtime.bus().clone(), channels));

    runtime.register_plugin(audit.clone())?;
    runtime.register_plugin(Arc::new(GreeterPlugin::new(
        runtime.publisher().clone(),
        runtime.configs().clone(),
    )))?;

    Ok(audit)
}

/// Exercise the running system: publish, deduplicate, reject, reconfigure.
pub async fn run(runtime: &PluginRuntime) -> Result<()> {
    let bus = runtime.bus();
    let publisher = runtime.publisher();

    let event = Event::builder("SYSTEM.HEARTBEAT", "system")
        .source("demo")
        .data(json!({ "uptime_ms": 0 }))
        .build();
    let first = publisher.publish(event.clone()).await.context("publish heartbeat")?;
    let again = publisher.publish(event).await.context("republish heartbeat")?;
    info!(?first, ?again, "Heartbeat published twice");
    if again != PublishOutcome::Duplicate {
        anyhow::bail!("republished heartbeat was not deduplicated");
    }

    let invalid = Event::builder("not a type", "system").build();
    if let Err(e) = publisher.publish(invalid).await {
        info!(error = %e, "Invalid event rejected as expected");
    }

    let result = runtime
        .configs()
        .update_config(GREETER_PLUGIN, config_of(json!({ "audience": "plugins" })))
        .await;
    info!(valid = result.is_valid, "Greeter audience updated");

    let rejected = runtime
        .configs()
        .update_config(GREETER_PLUGIN, config_of(json!({ "audience": "nobody" })))
        .await;
    info!(valid = rejected.is_valid, errors = rejected.errors.len(), "Out-of-range audience rejected");

    bus.flush().await.context("flush pending batch")?;

    let stats = bus.stats();
    info!(
        published = stats.published,
        delivered = stats.delivered,
        duplicates = stats.duplicates,
        rejected = stats.rejected,
        config_writes = runtime.configs().stats().writes,
        "Demo complete"
    );
    Ok(())
}
