//! # Error Types
//!
//! Error taxonomy for the event core and the configuration manager.

use crate::validation::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// EVENT ERRORS
// =============================================================================

/// Error returned by a subscriber handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Channel registration and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A channel with this name is already registered.
    #[error("Channel '{0}' already exists")]
    AlreadyExists(String),

    /// No channel with this name is registered.
    #[error("Channel '{0}' does not exist")]
    NotFound(String),

    /// The router reached its channel cap.
    #[error("Maximum number of channels reached ({max})")]
    MaxChannels { max: usize },
}

/// Errors from the event core.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// Structural or custom-rule validation failed.
    #[error("Event validation failed: {}", .0.summary())]
    Validation(ValidationResult),

    /// One or more handlers failed during fan-out.
    #[error("Delivery failed on channel '{channel}': {}", .failures.join("; "))]
    Delivery {
        channel: String,
        failures: Vec<String>,
    },

    /// A handler failed outside of fan-out.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Subscription misuse (cap reached, duplicate handler).
    #[error("Subscription error on channel '{channel}': {reason}")]
    Subscription { channel: String, reason: String },

    /// A handler exceeded its allotted time.
    #[error("Handler on channel '{channel}' timed out after {timeout_ms}ms")]
    Timeout { channel: String, timeout_ms: u64 },

    /// Missing or duplicate channel.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Operation not allowed in the component's current state.
    #[error("{component} is {state}")]
    State {
        component: &'static str,
        state: &'static str,
    },

    /// The batch processor failed.
    #[error("Batch processing failed: {0}")]
    Batch(String),

    /// Payload could not be decompressed.
    #[error("Compression error: {0}")]
    Compression(String),
}

impl EventError {
    /// `component` rejected work because it is stopped.
    pub fn not_running(component: &'static str) -> Self {
        Self::State {
            component,
            state: "not running",
        }
    }

    /// `component` was started twice.
    pub fn already_running(component: &'static str) -> Self {
        Self::State {
            component,
            state: "already running",
        }
    }

    /// Whether this error came from a stopped component.
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::State { state: "not running", .. })
    }

    /// Validation errors carried by this error, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(result) => &result.errors,
            _ => &[],
        }
    }
}

// =============================================================================
// CONFIG ERRORS
// =============================================================================

/// Machine codes for configuration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigErrorCode {
    ValidationError,
    EncryptionError,
    DecryptionError,
    StorageError,
    NotFound,
    InvalidConfig,
}

impl fmt::Display for ConfigErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::EncryptionError => "ENCRYPTION_ERROR",
            Self::DecryptionError => "DECRYPTION_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidConfig => "INVALID_CONFIG",
        };
        f.write_str(code)
    }
}

/// A configuration failure, optionally tied to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigError {
    pub code: ConfigErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}: {}", self.code, field, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(code: ConfigErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    /// Error tied to a single field.
    pub fn field(code: ConfigErrorCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Outcome of a configuration write.
///
/// On failure the configuration was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
}

impl ConfigValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ConfigError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Failure with a single error.
    pub fn failure(error: ConfigError) -> Self {
        Self::from_errors(vec![error])
    }

    /// Errors tied to `field`.
    pub fn errors_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ConfigError> + 'a {
        self.errors
            .iter()
            .filter(move |e| e.field.as_deref() == Some(field))
    }
}
