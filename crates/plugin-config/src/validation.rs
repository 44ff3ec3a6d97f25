//! Schema validation for plugin configuration.
//!
//! Every declared field is checked and every failure is reported; nothing
//! short-circuits. A `null` value counts as absent.

use plugin_types::{ConfigError, ConfigErrorCode, ConfigSchema, ConfigValidationResult, PluginConfig};

/// Check `config` against `schema`.
///
/// With `reject_unknown` set, fields the schema does not declare are reported
/// as `INVALID_CONFIG`.
pub fn validate_config(
    config: &PluginConfig,
    schema: &ConfigSchema,
    reject_unknown: bool,
) -> ConfigValidationResult {
    let mut errors = Vec::new();

    for (name, field) in schema.fields() {
        let value = match config.get(name) {
            Some(v) if !v.is_null() => v,
            _ => {
                if field.required {
                    errors.push(ConfigError::field(
                        ConfigErrorCode::ValidationError,
                        name,
                        format!("{} is required", name),
                    ));
                }
                continue;
            }
        };

        if !field.field_type.matches(value) {
            errors.push(ConfigError::field(
                ConfigErrorCode::ValidationError,
                name,
                format!("{} must be of type {}", name, field.field_type),
            ));
            continue;
        }

        if let Some(allowed) = &field.allowed {
            if !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                errors.push(ConfigError::field(
                    ConfigErrorCode::ValidationError,
                    name,
                    format!("{} must be one of [{}]", name, options.join(", ")),
                ));
                continue;
            }
        }

        if let Some(validate) = &field.validate {
            if let Err(message) = validate(value) {
                errors.push(ConfigError::field(
                    ConfigErrorCode::ValidationError,
                    name,
                    message,
                ));
            }
        }
    }

    if reject_unknown {
        for name in config.keys().filter(|k| schema.get(k).is_none()) {
            errors.push(ConfigError::field(
                ConfigErrorCode::InvalidConfig,
                name,
                format!("{} is not declared in the schema", name),
            ));
        }
    }

    ConfigValidationResult::from_errors(errors)
}
