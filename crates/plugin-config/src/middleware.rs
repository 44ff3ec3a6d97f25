//! # Config Middleware
//!
//! Ordered steps run on every configuration write.
//!
//! `handle` runs before validation and may rewrite the config or halt the
//! chain by returning [`MiddlewareFlow::Halt`]; a halted write is not stored.
//! `persist` runs after validation and sealing, only for writes that will be
//! stored, and sees the sealed form. `on_clear` runs when a plugin's config
//! is removed.

use crate::store::ConfigStore;
use crate::validation::validate_config;
use async_trait::async_trait;
use plugin_types::{ConfigError, ConfigSchema, ConfigValidationResult, PluginConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// What a middleware sees of a pending write.
#[derive(Debug)]
pub struct ConfigContext<'a> {
    pub plugin: &'a str,
    /// Merged plaintext config; middleware may rewrite it.
    pub config: PluginConfig,
    pub schema: Option<&'a ConfigSchema>,
}

/// Continue to the next step or stop with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareFlow {
    Continue,
    /// Stop here. The write is not stored and this result is returned.
    Halt(ConfigValidationResult),
}

#[async_trait]
pub trait ConfigMiddleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &mut ConfigContext<'_>) -> MiddlewareFlow;

    /// Called with the sealed config just before it is stored.
    async fn persist(&self, _plugin: &str, _sealed: &PluginConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Called after a plugin's config was cleared.
    async fn on_clear(&self, _plugin: &str) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Logs every write.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl ConfigMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, ctx: &mut ConfigContext<'_>) -> MiddlewareFlow {
        let keys: Vec<&str> = ctx.config.keys().map(String::as_str).collect();
        info!(
            plugin = %ctx.plugin,
            keys = ?keys,
            has_schema = ctx.schema.is_some(),
            "Config write"
        );
        MiddlewareFlow::Continue
    }
}

/// Halts the chain when the config does not satisfy the plugin's schema.
#[derive(Debug, Default)]
pub struct ValidationMiddleware {
    reject_unknown: bool,
}

impl ValidationMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also halt on fields the schema does not declare.
    pub fn strict() -> Self {
        Self {
            reject_unknown: true,
        }
    }
}

#[async_trait]
impl ConfigMiddleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn handle(&self, ctx: &mut ConfigContext<'_>) -> MiddlewareFlow {
        let Some(schema) = ctx.schema else {
            return MiddlewareFlow::Continue;
        };

        let result = validate_config(&ctx.config, schema, self.reject_unknown);
        if result.is_valid {
            MiddlewareFlow::Continue
        } else {
            debug!(plugin = %ctx.plugin, errors = result.errors.len(), "Validation middleware halted write");
            MiddlewareFlow::Halt(result)
        }
    }
}

/// Writes accepted configs through to a [`ConfigStore`].
pub struct PersistenceMiddleware {
    store: Arc<dyn ConfigStore>,
}

impl PersistenceMiddleware {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }
}

#[async_trait]
impl ConfigMiddleware for PersistenceMiddleware {
    fn name(&self) -> &str {
        "persistence"
    }

    async fn handle(&self, _ctx: &mut ConfigContext<'_>) -> MiddlewareFlow {
        MiddlewareFlow::Continue
    }

    async fn persist(&self, plugin: &str, sealed: &PluginConfig) -> Result<(), ConfigError> {
        self.store.save(plugin, sealed).await
    }

    async fn on_clear(&self, plugin: &str) -> Result<(), ConfigError> {
        self.store.remove(plugin).await.map(|_| ())
    }
}
