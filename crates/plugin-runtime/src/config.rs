//! # Runtime Configuration
//!
//! One struct for every component the runtime builds, loaded from `PLUGIN_*`
//! environment variables.
//!
//! ## Security Requirements
//!
//! - An encryption key, when given, MUST be exactly 32 bytes (64 hex chars)
//! - Unparseable numeric values fall back to defaults; bad keys are rejected
//!   by [`RuntimeConfig::validate`] instead of silently dropped

use plugin_bus::{BatchConfig, BusConfig};
use plugin_config::ConfigManagerConfig;
use plugin_crypto::{Cipher, SecretKey};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Channel the runtime always registers for config change notifications.
pub const CONFIG_CHANNEL: &str = "config";

/// Event type published when a plugin's configuration changes.
pub const CONFIG_UPDATED_EVENT: &str = "CONFIG.UPDATED";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bus: BusConfig,
    pub config_manager: ConfigManagerConfig,
    /// Channels registered at startup, in addition to [`CONFIG_CHANNEL`].
    pub channels: Vec<String>,
    /// Key for sensitive config fields. `None` stores them in plaintext.
    pub encryption_key: Option<Vec<u8>>,
    pub cipher: Cipher,
    /// Persist configs as JSON files in this directory.
    pub config_dir: Option<PathBuf>,
    /// How often counters are mirrored into Prometheus.
    pub monitor_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            config_manager: ConfigManagerConfig::default(),
            channels: vec!["system".to_string(), "plugins".to_string()],
            encryption_key: None,
            cipher: Cipher::default(),
            config_dir: None,
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// Inconsistent runtime settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeConfigError {
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("encryption key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("channel name must not be empty")]
    EmptyChannel,
}

impl RuntimeConfig {
    /// Read `PLUGIN_*` variables.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `PLUGIN_MAX_CHANNELS` | router channel cap |
    /// | `PLUGIN_MAX_SUBSCRIBERS` | router per-channel subscriber cap |
    /// | `PLUGIN_HANDLER_TIMEOUT_MS` | per-handler time limit |
    /// | `PLUGIN_DEDUP_WINDOW_SECS` | identity expiration window |
    /// | `PLUGIN_COMPRESSION_THRESHOLD` | compression threshold in bytes |
    /// | `PLUGIN_HISTORY_CAPACITY` | event history size |
    /// | `PLUGIN_BATCH_SIZE` | enables batching with this max size |
    /// | `PLUGIN_BATCH_INTERVAL_MS` | batch flush interval |
    /// | `PLUGIN_CHANNELS` | comma-separated startup channels |
    /// | `PLUGIN_ENCRYPTION_KEY` | hex-encoded 32-byte key |
    /// | `PLUGIN_CIPHER` | `xchacha20poly1305` or `aes256gcm` |
    /// | `PLUGIN_CONFIG_DIR` | directory for persisted configs |
    /// | `PLUGIN_MONITOR_INTERVAL_MS` | metrics mirroring period |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let mut config = Self::default();

        if let Some(v) = number("PLUGIN_MAX_CHANNELS") {
            config.bus.router.max_channels = v as usize;
        }
        if let Some(v) = number("PLUGIN_MAX_SUBSCRIBERS") {
            config.bus.router.max_subscribers_per_channel = v as usize;
        }
        if let Some(v) = number("PLUGIN_HANDLER_TIMEOUT_MS") {
            config.bus.router.handler_timeout = Some(Duration::from_millis(v));
        }
        if let Some(v) = number("PLUGIN_DEDUP_WINDOW_SECS") {
            config.bus.identity.expiration = Duration::from_secs(v);
        }
        if let Some(v) = number("PLUGIN_COMPRESSION_THRESHOLD") {
            config.bus.compression.threshold_bytes = v as usize;
        }
        if let Some(v) = number("PLUGIN_HISTORY_CAPACITY") {
            config.bus.history_capacity = v as usize;
        }

        if let Some(size) = number("PLUGIN_BATCH_SIZE") {
            let mut batch = BatchConfig {
                max_size: size as usize,
                ..BatchConfig::default()
            };
            if let Some(ms) = number("PLUGIN_BATCH_INTERVAL_MS") {
                batch.flush_interval = Duration::from_millis(ms);
            }
            config.bus.batch = Some(batch);
        }

        if let Some(channels) = lookup("PLUGIN_CHANNELS") {
            config.channels = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(raw) = lookup("PLUGIN_ENCRYPTION_KEY") {
            let raw = raw.trim();
            // Keep undecodable input so validate() reports it
            config.encryption_key =
                Some(hex::decode(raw).unwrap_or_else(|_| raw.as_bytes().to_vec()));
        }
        if let Some(cipher) = lookup("PLUGIN_CIPHER").and_then(|c| Cipher::from_name(c.trim())) {
            config.cipher = cipher;
        }

        config.config_dir = lookup("PLUGIN_CONFIG_DIR").map(PathBuf::from);

        if let Some(ms) = number("PLUGIN_MONITOR_INTERVAL_MS") {
            config.monitor_interval = Duration::from_millis(ms);
        }

        config
    }

    /// Reject settings the components cannot run with.
    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        if self.bus.router.max_channels == 0 {
            return Err(RuntimeConfigError::ZeroLimit("max_channels"));
        }
        if self.bus.router.max_subscribers_per_channel == 0 {
            return Err(RuntimeConfigError::ZeroLimit("max_subscribers_per_channel"));
        }
        if let Some(batch) = &self.bus.batch {
            if batch.max_size == 0 {
                return Err(RuntimeConfigError::ZeroLimit("batch max_size"));
            }
            if batch.flush_interval.is_zero() {
                return Err(RuntimeConfigError::ZeroLimit("batch flush_interval"));
            }
        }
        if self.monitor_interval.is_zero() {
            return Err(RuntimeConfigError::ZeroLimit("monitor_interval"));
        }
        if self.channels.iter().any(String::is_empty) {
            return Err(RuntimeConfigError::EmptyChannel);
        }
        if let Some(key) = &self.encryption_key {
            if key.len() != SecretKey::LEN {
                return Err(RuntimeConfigError::InvalidKeyLength(key.len()));
            }
        }
        Ok(())
    }
}
