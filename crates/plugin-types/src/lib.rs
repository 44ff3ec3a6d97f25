//! # Plugin Types Crate
//!
//! Plain data shared across the plugin event and configuration core.
//!
//! ## Contents
//!
//! - `event`: the `Event` record and its `UPPER.CASE` type grammar
//! - `validation`: `ValidationRule`, `ValidationError`, `ValidationResult`
//! - `config`: `ConfigSchema`, `FieldSchema`, `PluginConfig`
//! - `errors`: `EventError`, `ConfigError` and friends
//!
//! ## Design Principles
//!
//! - **Payloads are dynamic at the edge only**: `Event::data` is a JSON value,
//!   typed access goes through `Event::payload::<T>()`.
//! - **Events are immutable once published**: the bus hands subscribers a
//!   shared `Arc<Event>`.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod errors;
pub mod event;
pub mod validation;

pub use config::{ConfigSchema, FieldSchema, FieldType, FieldValidator, PluginConfig};
pub use errors::*;
pub use event::{is_valid_event_type, now_millis, Event, EventBuilder};
pub use validation::{
    codes, PredicateRule, ValidationError, ValidationResult, ValidationRule,
};
