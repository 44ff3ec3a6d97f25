//! # Sensitive Field Encryption
//!
//! Seals individual config values so secrets are never held or persisted in
//! plaintext.
//!
//! ## Sealed Form
//!
//! ```json
//! { "__encrypted": "<base64 nonce||ciphertext>", "cipher": "xchacha20poly1305" }
//! ```
//!
//! The plaintext is the value's JSON encoding, so any JSON type round-trips.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use plugin_crypto::{blake3_derive_key, Cipher, FieldCipher, SecretKey};
use plugin_types::{ConfigError, ConfigErrorCode, ConfigSchema, PluginConfig};
use serde_json::{json, Value};

/// Marker key of a sealed value.
pub const ENCRYPTED_KEY: &str = "__encrypted";

const KEY_CONTEXT: &str = "plugin-core config field encryption v1";

/// Seals and opens config values.
#[derive(Clone, Debug)]
pub struct FieldEncryptor {
    cipher: FieldCipher,
}

impl FieldEncryptor {
    pub fn new(cipher: Cipher, key: SecretKey) -> Self {
        Self {
            cipher: FieldCipher::new(cipher, key),
        }
    }

    /// Derive the key from an operator secret of any length.
    pub fn from_secret(cipher: Cipher, secret: &[u8]) -> Self {
        Self::new(
            cipher,
            SecretKey::from_bytes(blake3_derive_key(KEY_CONTEXT, secret)),
        )
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher.cipher()
    }

    /// Whether `value` is in sealed form.
    pub fn is_encrypted(value: &Value) -> bool {
        value.get(ENCRYPTED_KEY).is_some_and(Value::is_string)
    }

    pub fn encrypt_value(&self, value: &Value) -> Result<Value, ConfigError> {
        let plaintext = serde_json::to_vec(value)
            .map_err(|e| ConfigError::new(ConfigErrorCode::EncryptionError, e.to_string()))?;
        let sealed = self
            .cipher
            .seal(&plaintext)
            .map_err(|e| ConfigError::new(ConfigErrorCode::EncryptionError, e.to_string()))?;

        Ok(json!({
            ENCRYPTED_KEY: STANDARD.encode(sealed),
            "cipher": self.cipher().name(),
        }))
    }

    pub fn decrypt_value(&self, value: &Value) -> Result<Value, ConfigError> {
        let decryption_error = |message: String| ConfigError::new(ConfigErrorCode::DecryptionError, message);

        let encoded = value
            .get(ENCRYPTED_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| decryption_error("value is not sealed".into()))?;

        let cipher_name = value.get("cipher").and_then(Value::as_str).unwrap_or_default();
        if Cipher::from_name(cipher_name) != Some(self.cipher()) {
            return Err(decryption_error(format!(
                "sealed with '{}', expected '{}'",
                cipher_name,
                self.cipher().name()
            )));
        }

        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| decryption_error(e.to_string()))?;
        let plaintext = self
            .cipher
            .open(&sealed)
            .map_err(|e| decryption_error(e.to_string()))?;

        serde_json::from_slice(&plaintext).map_err(|e| decryption_error(e.to_string()))
    }

    /// Seal every field `schema` marks sensitive. `null` values stay as is.
    pub fn seal_config(
        &self,
        config: &PluginConfig,
        schema: &ConfigSchema,
    ) -> Result<PluginConfig, ConfigError> {
        config
            .iter()
            .map(|(name, value)| {
                let stored = if schema.is_sensitive(name) && !value.is_null() {
                    self.encrypt_value(value).map_err(|e| ConfigError {
                        field: Some(name.clone()),
                        ..e
                    })?
                } else {
                    value.clone()
                };
                Ok((name.clone(), stored))
            })
            .collect()
    }

    /// Open the sealed values of fields `schema` marks sensitive. Other
    /// fields are returned as stored, even if they look sealed.
    pub fn open_config(
        &self,
        config: &PluginConfig,
        schema: &ConfigSchema,
    ) -> Result<PluginConfig, ConfigError> {
        config
            .iter()
            .map(|(name, value)| {
                let plain = if schema.is_sensitive(name) && Self::is_encrypted(value) {
                    self.decrypt_value(value).map_err(|e| ConfigError {
                        field: Some(name.clone()),
                        ..e
                    })?
                } else {
                    value.clone()
                };
                Ok((name.clone(), plain))
            })
            .collect()
    }
}
