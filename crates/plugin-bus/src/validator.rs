//! # Async Event Validator
//!
//! Structural checks plus pluggable custom rules.
//!
//! ## Checks
//!
//! | Check | Code | Path |
//! |-------|------|------|
//! | `id` empty | `REQUIRED` | `id` |
//! | `type` empty | `REQUIRED` | `type` |
//! | `type` not `UPPER.CASE` | `INVALID_TYPE_FORMAT` | `type` |
//! | `channel` empty | `REQUIRED` | `channel` |
//! | `data` null | `REQUIRED` | `data` |
//! | `timestamp` negative | `INVALID_TIMESTAMP` | `timestamp` |
//! | `timestamp` beyond clock skew | `FUTURE_TIMESTAMP` | `timestamp` |
//!
//! Every check runs; errors accumulate rather than short-circuit.

use futures::future::join_all;
use parking_lot::RwLock;
use plugin_types::{codes, now_millis, Event, ValidationError, ValidationResult, ValidationRule};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Validator settings.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Run the required-field and type-format checks.
    pub check_schema: bool,
    /// Run the timestamp checks.
    pub check_timestamp: bool,
    /// How far in the future a timestamp may be.
    pub max_clock_skew: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            check_schema: true,
            check_timestamp: true,
            max_clock_skew: Duration::from_secs(5),
        }
    }
}

/// Validates events against built-in checks and registered rules.
///
/// Constructed stopped; call [`AsyncValidator::start`] before validating.
pub struct AsyncValidator {
    config: ValidatorConfig,
    running: AtomicBool,
    rules: RwLock<Vec<Arc<dyn ValidationRule>>>,
}

impl AsyncValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Validator started");
        }
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Validator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a custom rule. Rules run in registration order.
    pub fn add_rule(&self, rule: Arc<dyn ValidationRule>) {
        debug!(code = rule.error_code(), "Validation rule added");
        self.rules.write().push(rule);
    }

    /// Remove every rule reporting `code`, returning how many were removed.
    pub fn remove_rule(&self, code: &str) -> usize {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.error_code() != code);
        before - rules.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate one event.
    ///
    /// While stopped this returns a failed result carrying a single
    /// `VALIDATOR_NOT_RUNNING` error.
    pub async fn validate(&self, event: &Event) -> ValidationResult {
        if !self.is_running() {
            return ValidationResult::from_errors(vec![ValidationError::new(
                "",
                codes::VALIDATOR_NOT_RUNNING,
                "Validator is not running",
            )]);
        }

        let mut errors = Vec::new();

        if self.config.check_schema {
            self.check_schema(event, &mut errors);
        }
        if self.config.check_timestamp {
            self.check_timestamp(event, &mut errors);
        }

        // Snapshot so the lock is not held across awaits.
        let rules: Vec<_> = self.rules.read().clone();
        for rule in rules {
            match rule.validate(event).await {
                Ok(true) => {}
                Ok(false) => errors.push(ValidationError::new(
                    rule.error_path(),
                    rule.error_code(),
                    rule.error_message(),
                )),
                Err(message) => errors.push(ValidationError::new(
                    rule.error_path(),
                    codes::VALIDATION_ERROR,
                    message,
                )),
            }
        }

        if !errors.is_empty() {
            debug!(
                event_id = %event.id,
                errors = errors.len(),
                "Event failed validation"
            );
        }

        ValidationResult::from_errors(errors)
    }

    /// Validate each event independently, preserving input order.
    pub async fn validate_batch(&self, events: &[Event]) -> Vec<ValidationResult> {
        join_all(events.iter().map(|event| self.validate(event))).await
    }

    fn check_schema(&self, event: &Event, errors: &mut Vec<ValidationError>) {
        if event.id.is_empty() {
            errors.push(ValidationError::new("id", codes::REQUIRED, "Event id is required"));
        }

        if event.event_type.is_empty() {
            errors.push(ValidationError::new(
                "type",
                codes::REQUIRED,
                "Event type is required",
            ));
        } else if !event.has_valid_type() {
            errors.push(ValidationError::new(
                "type",
                codes::INVALID_TYPE_FORMAT,
                format!(
                    "Event type '{}' must be UPPER_CASE dot-separated segments",
                    event.event_type
                ),
            ));
        }

        if event.channel.is_empty() {
            errors.push(ValidationError::new(
                "channel",
                codes::REQUIRED,
                "Event channel is required",
            ));
        }

        if event.data.is_null() {
            errors.push(ValidationError::new(
                "data",
                codes::REQUIRED,
                "Event data is required",
            ));
        }
    }

    fn check_timestamp(&self, event: &Event, errors: &mut Vec<ValidationError>) {
        if event.timestamp < 0 {
            errors.push(ValidationError::new(
                "timestamp",
                codes::INVALID_TIMESTAMP,
                "Timestamp must be a non-negative number",
            ));
            return;
        }

        let skew = self.config.max_clock_skew.as_millis() as i64;
        if event.timestamp > now_millis().saturating_add(skew) {
            errors.push(ValidationError::new(
                "timestamp",
                codes::FUTURE_TIMESTAMP,
                format!("Timestamp is more than {}ms in the future", skew),
            ));
        }
    }
}

impl Default for AsyncValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}
