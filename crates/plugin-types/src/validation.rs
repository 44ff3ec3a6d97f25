//! # Validation Records
//!
//! Rules and results shared by the event validator.
//!
//! A rule either passes (`Ok(true)`), fails (`Ok(false)`, reported with the
//! rule's declared path/code/message) or errors (`Err(msg)`, reported with the
//! generic `VALIDATION_ERROR` code and the error message).

use crate::event::Event;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Machine-readable validation codes.
pub mod codes {
    /// A required field is missing or empty.
    pub const REQUIRED: &str = "REQUIRED";
    /// The event type does not follow the `UPPER.CASE` grammar.
    pub const INVALID_TYPE_FORMAT: &str = "INVALID_TYPE_FORMAT";
    /// The timestamp is negative.
    pub const INVALID_TIMESTAMP: &str = "INVALID_TIMESTAMP";
    /// The timestamp is beyond the allowed clock skew.
    pub const FUTURE_TIMESTAMP: &str = "FUTURE_TIMESTAMP";
    /// A custom rule raised an error while evaluating.
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// Validation was requested while the validator was stopped.
    pub const VALIDATOR_NOT_RUNNING: &str = "VALIDATOR_NOT_RUNNING";
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field location, e.g. `type` or `data.user_id`.
    pub path: String,
    /// Machine code, see [`codes`].
    pub code: String,
    /// Human message.
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.code, self.message)
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Build a result from accumulated errors.
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// A passing result.
    pub fn valid() -> Self {
        Self::from_errors(Vec::new())
    }

    /// Whether any error carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Single-line summary of all errors.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A custom validation rule.
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Evaluate the rule. `Err` is reported as a `VALIDATION_ERROR`.
    async fn validate(&self, event: &Event) -> Result<bool, String>;

    /// Field location reported on failure.
    fn error_path(&self) -> &str;

    /// Machine code reported on failure.
    fn error_code(&self) -> &str;

    /// Human message reported on failure.
    fn error_message(&self) -> &str;
}

type Predicate = Arc<dyn Fn(&Event) -> Result<bool, String> + Send + Sync>;

/// Synchronous rule built from a closure.
#[derive(Clone)]
pub struct PredicateRule {
    path: String,
    code: String,
    message: String,
    predicate: Predicate,
}

impl PredicateRule {
    pub fn new<F>(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Event) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl fmt::Debug for PredicateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRule")
            .field("path", &self.path)
            .field("code", &self.code)
            .finish()
    }
}

#[async_trait]
impl ValidationRule for PredicateRule {
    async fn validate(&self, event: &Event) -> Result<bool, String> {
        (self.predicate)(event)
    }

    fn error_path(&self) -> &str {
        &self.path
    }

    fn error_code(&self) -> &str {
        &self.code
    }

    fn error_message(&self) -> &str {
        &self.message
    }
}
