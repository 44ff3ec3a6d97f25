//! Shared test fixtures.

use async_trait::async_trait;
use parking_lot::Mutex;
use plugin_bus::EventHandler;
use plugin_types::{ConfigSchema, Event, FieldSchema, FieldType, HandlerError, PluginConfig};
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler that keeps every event it receives.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Arc<Event>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn events(&self) -> Vec<Arc<Event>> {
        self.events.lock().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.id.clone()).collect()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Handler that always fails with `message`.
pub struct Failing {
    pub message: String,
}

impl Failing {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(Self {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl EventHandler for Failing {
    async fn handle(&self, _event: Arc<Event>) -> Result<(), HandlerError> {
        Err(HandlerError::new(self.message.clone()))
    }
}

/// A valid event on `channel` with a small payload.
pub fn event(channel: &str, event_type: &str) -> Event {
    Event::builder(event_type, channel)
        .source("fixture")
        .data(json!({ "n": 1 }))
        .build()
}

/// A valid event whose serialized payload is at least `bytes` long.
pub fn large_event(channel: &str, bytes: usize) -> Event {
    Event::builder("BULK.DATA", channel)
        .source("fixture")
        .data(json!({ "blob": "x".repeat(bytes) }))
        .build()
}

/// Schema for a service plugin with one sensitive field.
pub fn service_schema() -> ConfigSchema {
    ConfigSchema::new()
        .field("endpoint", FieldSchema::new(FieldType::String).required())
        .field(
            "retries",
            FieldSchema::new(FieldType::Integer)
                .default_value(json!(3))
                .validate(|v| match v.as_i64() {
                    Some(n) if (0..=10).contains(&n) => Ok(()),
                    _ => Err("retries must be between 0 and 10".to_string()),
                }),
        )
        .field("password", FieldSchema::new(FieldType::String).sensitive())
}

/// `value` as a config map; non-objects become empty.
pub fn config(value: Value) -> PluginConfig {
    match value {
        Value::Object(map) => map,
        _ => PluginConfig::new(),
    }
}
