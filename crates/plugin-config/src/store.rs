//! # Config Stores
//!
//! Where configurations live outside the manager. Stores only ever see the
//! sealed form.
//!
//! - [`InMemoryConfigStore`]: for tests and ephemeral hosts
//! - [`JsonFileConfigStore`]: one `<plugin>.json` file per plugin in a directory

use async_trait::async_trait;
use parking_lot::RwLock;
use plugin_types::{ConfigError, ConfigErrorCode, PluginConfig};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistence backend for plugin configurations.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `None` if nothing is stored for `plugin`.
    async fn load(&self, plugin: &str) -> Result<Option<PluginConfig>, ConfigError>;

    async fn save(&self, plugin: &str, config: &PluginConfig) -> Result<(), ConfigError>;

    /// Returns whether anything was removed.
    async fn remove(&self, plugin: &str) -> Result<bool, ConfigError>;

    /// Stored plugin names, sorted.
    async fn list(&self) -> Result<Vec<String>, ConfigError>;
}

fn storage_error(message: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigErrorCode::StorageError, message)
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

#[derive(Default)]
pub struct InMemoryConfigStore {
    configs: RwLock<HashMap<String, PluginConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self, plugin: &str) -> Result<Option<PluginConfig>, ConfigError> {
        Ok(self.configs.read().get(plugin).cloned())
    }

    async fn save(&self, plugin: &str, config: &PluginConfig) -> Result<(), ConfigError> {
        self.configs
            .write()
            .insert(plugin.to_string(), config.clone());
        Ok(())
    }

    async fn remove(&self, plugin: &str) -> Result<bool, ConfigError> {
        Ok(self.configs.write().remove(plugin).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, ConfigError> {
        let mut names: Vec<String> = self.configs.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

// =============================================================================
// JSON FILE STORE
// =============================================================================

/// Stores each plugin's config as pretty-printed JSON in `<dir>/<plugin>.json`.
///
/// Writes go to a temporary file first and are renamed into place.
pub struct JsonFileConfigStore {
    dir: PathBuf,
}

impl JsonFileConfigStore {
    /// Use `dir`, creating it if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, plugin: &str) -> Result<PathBuf, ConfigError> {
        let safe = !plugin.is_empty()
            && plugin
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !plugin.starts_with('.');
        if !safe {
            return Err(ConfigError::new(
                ConfigErrorCode::InvalidConfig,
                format!("'{}' is not a valid plugin name for file storage", plugin),
            ));
        }
        Ok(self.dir.join(format!("{}.json", plugin)))
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn load(&self, plugin: &str) -> Result<Option<PluginConfig>, ConfigError> {
        let path = self.path_for(plugin)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(format!("read {}: {}", path.display(), e))),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| storage_error(format!("parse {}: {}", path.display(), e)))
    }

    async fn save(&self, plugin: &str, config: &PluginConfig) -> Result<(), ConfigError> {
        let path = self.path_for(plugin)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(config).map_err(|e| storage_error(e.to_string()))?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_error(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error(format!("rename to {}: {}", path.display(), e)))?;

        debug!(plugin = %plugin, path = %path.display(), "Config persisted");
        Ok(())
    }

    async fn remove(&self, plugin: &str) -> Result<bool, ConfigError> {
        let path = self.path_for(plugin)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error(format!("remove {}: {}", path.display(), e))),
        }
    }

    async fn list(&self) -> Result<Vec<String>, ConfigError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| storage_error(format!("list {}: {}", self.dir.display(), e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
