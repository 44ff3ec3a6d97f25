//! # Events
//!
//! The record that flows through the bus.
//!
//! ## Event Type Grammar
//!
//! Event types are `UPPER_CASE` segments separated by dots:
//!
//! ```text
//! USER.CREATED        ✓
//! PLUGIN.CONFIG_SET   ✓
//! user.created        ✗ (lowercase)
//! USER..CREATED       ✗ (empty segment)
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A single occurrence published on a channel.
///
/// `id` is unique per logical occurrence (random or content-derived).
/// `timestamp` is milliseconds since the Unix epoch; it is signed so that
/// malformed negative values coming from the edge can be represented and
/// rejected by the validator rather than by the deserializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier.
    #[serde(default)]
    pub id: String,
    /// `UPPER.CASE` event type.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Target channel name.
    #[serde(default)]
    pub channel: String,
    /// Publishing plugin.
    #[serde(default)]
    pub source: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    /// Opaque payload.
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Start building an event for `channel` with a fresh random id and the
    /// current timestamp.
    pub fn builder(event_type: impl Into<String>, channel: impl Into<String>) -> EventBuilder {
        EventBuilder {
            event: Event {
                id: Uuid::new_v4().to_string(),
                event_type: event_type.into(),
                channel: channel.into(),
                source: String::new(),
                timestamp: now_millis(),
                data: Value::Null,
            },
        }
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }

    /// Stable string describing the event content, excluding id and timestamp.
    ///
    /// Two events carrying the same logical content produce the same key, which
    /// makes it suitable input for deterministic identifiers. The fields are
    /// encoded as a JSON array, so no field value can spill into its neighbour.
    pub fn content_key(&self) -> String {
        serde_json::to_string(&(&self.event_type, &self.channel, &self.source, &self.data))
            .unwrap_or_default()
    }

    /// Whether the event type follows the `UPPER.CASE` grammar.
    pub fn has_valid_type(&self) -> bool {
        is_valid_event_type(&self.event_type)
    }
}

/// Fluent constructor returned by [`Event::builder`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    /// Override the generated id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.event.id = id.into();
        self
    }

    /// Set the publishing plugin.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.event.source = source.into();
        self
    }

    /// Override the generated timestamp.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    /// Set a raw JSON payload.
    pub fn data(mut self, data: Value) -> Self {
        self.event.data = data;
        self
    }

    /// Serialize a typed payload.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.event.data = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> Event {
        self.event
    }
}

/// Check an event type against the `UPPER.CASE` grammar.
///
/// Each dot-separated segment must start with `A-Z` and continue with
/// `A-Z`, `0-9` or `_`.
pub fn is_valid_event_type(event_type: &str) -> bool {
    if event_type.is_empty() {
        return false;
    }

    event_type.split('.').all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_ascii_uppercase() => chars
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'),
            _ => false,
        }
    })
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
