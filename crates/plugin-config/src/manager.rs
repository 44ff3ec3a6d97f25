//! # Config Manager
//!
//! Holds one configuration per plugin, in sealed form, and runs the write
//! pipeline described at the crate root.
//!
//! ## Sensitive Fields
//!
//! With an encryptor configured, fields the schema marks `sensitive` are
//! sealed before they are stored or handed to persistence middleware. Without
//! one they are stored as given.

use crate::encryption::FieldEncryptor;
use crate::middleware::{ConfigContext, ConfigMiddleware, MiddlewareFlow};
use crate::store::ConfigStore;
use crate::validation::validate_config;
use parking_lot::RwLock;
use plugin_types::{
    ConfigError, ConfigErrorCode, ConfigSchema, ConfigValidationResult, PluginConfig,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Manager settings.
#[derive(Debug, Clone)]
pub struct ConfigManagerConfig {
    /// Report fields the schema does not declare as `INVALID_CONFIG`.
    pub reject_unknown_fields: bool,
    /// Capacity of the change broadcast channel.
    pub change_buffer: usize,
}

impl Default for ConfigManagerConfig {
    fn default() -> Self {
        Self {
            reject_unknown_fields: false,
            change_buffer: crate::DEFAULT_CHANGE_BUFFER,
        }
    }
}

/// Notification sent after a successful write or clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub plugin: String,
    /// Keys of the stored config. Empty when the config was cleared.
    pub keys: Vec<String>,
}

/// Write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfigStats {
    pub writes: u64,
    pub rejected: u64,
}

pub struct ConfigManager {
    config: ConfigManagerConfig,
    schemas: RwLock<HashMap<String, ConfigSchema>>,
    /// Sealed configs keyed by plugin.
    configs: RwLock<HashMap<String, PluginConfig>>,
    middleware: RwLock<Vec<Arc<dyn ConfigMiddleware>>>,
    encryptor: Option<FieldEncryptor>,
    changes: broadcast::Sender<ConfigChange>,
    writes: AtomicU64,
    rejected: AtomicU64,
}

impl ConfigManager {
    pub fn new(config: ConfigManagerConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_buffer.max(1));
        Self {
            config,
            schemas: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            encryptor: None,
            changes,
            writes: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Seal sensitive fields with `encryptor`.
    pub fn with_encryption(mut self, encryptor: FieldEncryptor) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn is_encrypting(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Append a middleware to the chain.
    pub fn use_middleware(&self, middleware: Arc<dyn ConfigMiddleware>) {
        debug!(middleware = middleware.name(), "Config middleware added");
        self.middleware.write().push(middleware);
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Associate `schema` with `plugin`, replacing any previous one.
    pub fn register_schema(&self, plugin: &str, schema: ConfigSchema) {
        info!(plugin = %plugin, fields = schema.len(), "Config schema registered");
        self.schemas.write().insert(plugin.to_string(), schema);
    }

    pub fn get_schema(&self, plugin: &str) -> Option<ConfigSchema> {
        self.schemas.read().get(plugin).cloned()
    }

    /// Merge `config` over the schema defaults and store it.
    ///
    /// On failure nothing is stored and the previous config stays in place.
    pub async fn set_config(&self, plugin: &str, config: PluginConfig) -> ConfigValidationResult {
        let schema = self.get_schema(plugin);
        let mut merged = schema.as_ref().map(ConfigSchema::defaults).unwrap_or_default();
        merged.extend(config);
        self.commit(plugin, merged, schema).await
    }

    /// Merge `partial` over the current config (or the defaults if none) and
    /// store it.
    pub async fn update_config(&self, plugin: &str, partial: PluginConfig) -> ConfigValidationResult {
        let schema = self.get_schema(plugin);

        let mut merged = match self.get_config(plugin) {
            Ok(current) if self.has_config(plugin) => current,
            Ok(_) => schema.as_ref().map(ConfigSchema::defaults).unwrap_or_default(),
            Err(e) => return self.reject(plugin, ConfigValidationResult::failure(e)),
        };
        merged.extend(partial);
        self.commit(plugin, merged, schema).await
    }

    /// The stored config with sensitive fields opened, or an empty map if the
    /// plugin was never configured.
    ///
    /// # Errors
    ///
    /// `DECRYPTION_ERROR` if a sealed field cannot be opened.
    pub fn get_config(&self, plugin: &str) -> Result<PluginConfig, ConfigError> {
        let Some(stored) = self.configs.read().get(plugin).cloned() else {
            return Ok(PluginConfig::new());
        };

        match (&self.encryptor, self.get_schema(plugin)) {
            (Some(encryptor), Some(schema)) => encryptor.open_config(&stored, &schema),
            _ => Ok(stored),
        }
    }

    /// The config exactly as held, sealed fields included.
    pub fn stored_config(&self, plugin: &str) -> Option<PluginConfig> {
        self.configs.read().get(plugin).cloned()
    }

    pub fn has_config(&self, plugin: &str) -> bool {
        self.configs.read().contains_key(plugin)
    }

    /// Configured plugin names, sorted.
    pub fn plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove `plugin`'s config. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// A middleware `on_clear` hook failed; the in-memory config is already
    /// removed.
    pub async fn clear_config(&self, plugin: &str) -> Result<bool, ConfigError> {
        let removed = self.configs.write().remove(plugin).is_some();
        if !removed {
            return Ok(false);
        }

        for middleware in self.chain() {
            middleware.on_clear(plugin).await?;
        }

        info!(plugin = %plugin, "Config cleared");
        let _ = self.changes.send(ConfigChange {
            plugin: plugin.to_string(),
            keys: Vec::new(),
        });
        Ok(true)
    }

    /// Remove every config. Schemas stay registered.
    pub async fn clear_all(&self) -> Result<usize, ConfigError> {
        let plugins = self.plugins();
        let mut cleared = 0;
        for plugin in &plugins {
            if self.clear_config(plugin).await? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Rehydrate `plugin` from a store holding sealed configs.
    ///
    /// The loaded config must open with this manager's encryptor and satisfy
    /// the registered schema. Middleware is not run.
    pub async fn load_from_store(
        &self,
        store: &dyn ConfigStore,
        plugin: &str,
    ) -> ConfigValidationResult {
        let sealed = match store.load(plugin).await {
            Ok(Some(sealed)) => sealed,
            Ok(None) => {
                return ConfigValidationResult::failure(ConfigError::new(
                    ConfigErrorCode::NotFound,
                    format!("No stored config for plugin '{}'", plugin),
                ))
            }
            Err(e) => return ConfigValidationResult::failure(e),
        };

        let schema = self.get_schema(plugin);
        let plain = match (&self.encryptor, &schema) {
            (Some(encryptor), Some(schema)) => match encryptor.open_config(&sealed, schema) {
                Ok(plain) => plain,
                Err(e) => return ConfigValidationResult::failure(e),
            },
            _ => sealed.clone(),
        };

        if let Some(schema) = &schema {
            let result = validate_config(&plain, schema, self.config.reject_unknown_fields);
            if !result.is_valid {
                return result;
            }
        }

        self.store(plugin, sealed, &plain);
        info!(plugin = %plugin, "Config loaded from store");
        ConfigValidationResult::valid()
    }

    /// Receive a [`ConfigChange`] after every successful write or clear.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    pub fn stats(&self) -> ConfigStats {
        ConfigStats {
            writes: self.writes.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn chain(&self) -> Vec<Arc<dyn ConfigMiddleware>> {
        self.middleware.read().clone()
    }

    async fn commit(
        &self,
        plugin: &str,
        config: PluginConfig,
        schema: Option<ConfigSchema>,
    ) -> ConfigValidationResult {
        let chain = self.chain();

        let mut ctx = ConfigContext {
            plugin,
            config,
            schema: schema.as_ref(),
        };
        for middleware in &chain {
            if let MiddlewareFlow::Halt(result) = middleware.handle(&mut ctx).await {
                debug!(plugin = %plugin, middleware = middleware.name(), "Config chain halted");
                return self.reject(plugin, result);
            }
        }
        let config = ctx.config;

        if let Some(schema) = &schema {
            let result = validate_config(&config, schema, self.config.reject_unknown_fields);
            if !result.is_valid {
                return self.reject(plugin, result);
            }
        }

        let sealed = match (&self.encryptor, &schema) {
            (Some(encryptor), Some(schema)) => match encryptor.seal_config(&config, schema) {
                Ok(sealed) => sealed,
                Err(e) => return self.reject(plugin, ConfigValidationResult::failure(e)),
            },
            _ => config.clone(),
        };

        for middleware in &chain {
            if let Err(e) = middleware.persist(plugin, &sealed).await {
                return self.reject(plugin, ConfigValidationResult::failure(e));
            }
        }

        self.store(plugin, sealed, &config);
        self.writes.fetch_add(1, Ordering::Relaxed);
        ConfigValidationResult::valid()
    }

    fn store(&self, plugin: &str, sealed: PluginConfig, plain: &PluginConfig) {
        self.configs.write().insert(plugin.to_string(), sealed);
        debug!(plugin = %plugin, fields = plain.len(), "Config stored");

        let _ = self.changes.send(ConfigChange {
            plugin: plugin.to_string(),
            keys: plain.keys().cloned().collect(),
        });
    }

    fn reject(&self, plugin: &str, result: ConfigValidationResult) -> ConfigValidationResult {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(
            plugin = %plugin,
            errors = ?result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Config write rejected"
        );
        result
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(ConfigManagerConfig::default())
    }
}
