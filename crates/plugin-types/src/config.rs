//! # Plugin Configuration Schema
//!
//! Declares the shape of a plugin's configuration: field types, required
//! fields, defaults, custom validators and the `sensitive` flag marking fields
//! that must be encrypted at rest.
//!
//! ## Example
//!
//! ```rust
//! use plugin_types::{ConfigSchema, FieldSchema, FieldType};
//! use serde_json::json;
//!
//! let schema = ConfigSchema::new()
//!     .field("endpoint", FieldSchema::new(FieldType::String).required())
//!     .field("retries", FieldSchema::new(FieldType::Integer).default_value(json!(3)))
//!     .field("api_key", FieldSchema::new(FieldType::String).sensitive());
//!
//! assert_eq!(schema.defaults()["retries"], json!(3));
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A plugin's configuration: a JSON object keyed by field name.
pub type PluginConfig = Map<String, Value>;

/// Custom per-field check. `Err` carries the human message.
pub type FieldValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Declared type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Accepts any JSON value.
    Any,
}

impl FieldType {
    /// Whether `value` has this type. `null` never matches.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => !value.is_null(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declaration of a single configuration field.
#[derive(Clone)]
pub struct FieldSchema {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    /// Encrypt this field before storage.
    pub sensitive: bool,
    /// Enumerated allowed values, if restricted.
    pub allowed: Option<Vec<Value>>,
    pub validate: Option<FieldValidator>,
    pub description: Option<String>,
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            sensitive: false,
            allowed: None,
            validate: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validator));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSchema")
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("sensitive", &self.sensitive)
            .field("allowed", &self.allowed)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

/// Shape of a plugin's configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    fields: BTreeMap<String, FieldSchema>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field, replacing any previous declaration with that name.
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Config made of every declared default.
    pub fn defaults(&self) -> PluginConfig {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.default.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Names of fields flagged `sensitive`.
    pub fn sensitive_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, field)| field.sensitive)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|f| f.sensitive)
    }
}
