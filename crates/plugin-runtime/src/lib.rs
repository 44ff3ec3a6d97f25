//! # Plugin Runtime
//!
//! Builds exactly one [`EventBus`], one [`ConfigManager`] and one
//! [`PluginRegistry`], shares them through `Arc`, and runs the background
//! tasks that tie them together.
//!
//! ## Startup Sequence
//!
//! 1. Start the event bus and register the configured channels
//! 2. Attach file persistence for configs (if a directory is configured)
//! 3. Spawn the metrics monitor and the config change bridge
//! 4. Activate registered plugins in dependency order
//!
//! Shutdown runs the same steps in reverse.
//!
//! ## Config Change Bridge
//!
//! ```text
//! ConfigManager ──ConfigChange──→ bridge task ──CONFIG.UPDATED──→ EventBus("config")
//! ```

pub mod config;
pub mod demo;
pub mod monitor;

pub use config::{RuntimeConfig, RuntimeConfigError, CONFIG_CHANNEL, CONFIG_UPDATED_EVENT};
pub use monitor::{InstrumentedPublisher, MetricsMirror};

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use plugin_bus::{EventBus, EventPublisher};
use plugin_config::{
    ConfigChange, ConfigManager, FieldEncryptor, JsonFileConfigStore, LoggingMiddleware,
    PersistenceMiddleware,
};
use plugin_crypto::SecretKey;
use plugin_registry::{Plugin, PluginRegistry};
use plugin_types::Event;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopped,
}

/// Host for the plugin infrastructure. Single use: start once, shut down once.
pub struct PluginRuntime {
    config: RuntimeConfig,
    bus: Arc<EventBus>,
    publisher: Arc<InstrumentedPublisher>,
    configs: Arc<ConfigManager>,
    registry: Arc<PluginRegistry>,
    phase: Mutex<Phase>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl PluginRuntime {
    /// Validate `config` and build the managers.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate().context("invalid runtime configuration")?;

        let mut configs = ConfigManager::new(config.config_manager.clone());
        if let Some(key) = &config.encryption_key {
            let key = SecretKey::from_slice(key).context("invalid encryption key")?;
            configs = configs.with_encryption(FieldEncryptor::new(config.cipher, key));
        }
        configs.use_middleware(Arc::new(LoggingMiddleware));

        let (shutdown_tx, _) = watch::channel(false);

        info!(
            channels = config.channels.len(),
            batching = config.bus.batch.is_some(),
            encryption = configs.is_encrypting(),
            "Creating plugin runtime"
        );

        let bus = Arc::new(EventBus::new(config.bus.clone()));
        Ok(Self {
            publisher: Arc::new(InstrumentedPublisher::new(bus.clone())),
            bus,
            configs: Arc::new(configs),
            registry: Arc::new(PluginRegistry::new()),
            config,
            phase: Mutex::new(Phase::Created),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
        })
    }

    pub async fn start(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Created {
                bail!("plugin runtime cannot start from {:?}", *phase);
            }
            *phase = Phase::Running;
        }

        info!("===========================================");
        info!("  Plugin Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        self.bus.start().context("failed to start event bus")?;
        self.bus
            .register_channel(CONFIG_CHANNEL)
            .context("failed to register config channel")?;
        for channel in &self.config.channels {
            if channel != CONFIG_CHANNEL {
                self.bus
                    .register_channel(channel)
                    .with_context(|| format!("failed to register channel '{}'", channel))?;
            }
        }

        if let Some(dir) = &self.config.config_dir {
            let store = JsonFileConfigStore::open(dir)
                .await
                .context("failed to open config directory")?;
            self.configs
                .use_middleware(Arc::new(PersistenceMiddleware::new(Arc::new(store))));
            info!(dir = %dir.display(), "Config persistence enabled");
        }

        self.spawn_tasks();

        let activated = self
            .registry
            .activate_all()
            .await
            .context("failed to activate plugins")?;

        info!(
            plugins = activated.len(),
            channels = ?self.bus.router().channel_names(),
            "Plugin runtime running"
        );
        Ok(())
    }

    fn spawn_tasks(&self) {
        let monitor = tokio::spawn(monitor::run_monitor(
            self.bus.clone(),
            self.configs.clone(),
            self.registry.clone(),
            self.config.monitor_interval,
            self.shutdown_tx.subscribe(),
        ));

        let bridge = tokio::spawn(run_config_bridge(
            self.publisher.clone(),
            self.configs.subscribe_changes(),
            self.shutdown_tx.subscribe(),
        ));

        self.tasks.lock().extend([monitor, bridge]);
    }

    /// Deactivate plugins, stop background tasks, then stop the bus.
    ///
    /// Does nothing unless running.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Running {
                return Ok(());
            }
            *phase = Phase::Stopped;
        }

        info!("Shutting down plugin runtime...");

        if let Err(e) = self.registry.deactivate_all().await {
            warn!(error = %e, "Some plugins did not deactivate cleanly");
        }

        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.bus.stop().await.context("event bus stopped with errors")?;

        info!("Plugin runtime stopped");
        Ok(())
    }

    /// Register a plugin. Plugins registered before [`start`](Self::start)
    /// are activated by it.
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.registry.register(plugin)?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.phase.lock() == Phase::Running
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Publisher that records latency and error metrics. Host-side code
    /// should publish through this rather than the bare bus.
    pub fn publisher(&self) -> &Arc<InstrumentedPublisher> {
        &self.publisher
    }

    pub fn configs(&self) -> &Arc<ConfigManager> {
        &self.configs
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Drop for PluginRuntime {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Republish config changes on the bus until shutdown.
async fn run_config_bridge(
    publisher: Arc<InstrumentedPublisher>,
    mut changes: broadcast::Receiver<ConfigChange>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = changes.recv() => match received {
                Ok(change) => publish_config_change(publisher.as_ref(), change).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Config bridge lagged behind change notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn publish_config_change(publisher: &dyn EventPublisher, change: ConfigChange) {
    let event = Event::builder(CONFIG_UPDATED_EVENT, CONFIG_CHANNEL)
        .source("config-manager")
        .data(json!({ "plugin": change.plugin, "keys": change.keys }))
        .build();

    if let Err(e) = publisher.publish(event).await {
        warn!(plugin = %change.plugin, error = %e, "Failed to publish config change");
    }
}
