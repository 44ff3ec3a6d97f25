//! # Plugin Registry
//!
//! Owns the registered plugins, their statuses and the dependency graph.
//!
//! `activate_all` refuses to run when the graph has a cycle or a plugin
//! depends on something unregistered. Activation follows dependency order;
//! deactivation runs in exactly the reverse of the order plugins came up.

use crate::errors::RegistryError;
use crate::graph::PluginDependencyGraph;
use crate::plugin::{Plugin, PluginStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    status: PluginStatus,
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginEntry>>,
    graph: RwLock<PluginDependencyGraph>,
    /// Names in the order they became active.
    activated: Mutex<Vec<String>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin and record its declared dependencies.
    ///
    /// Cycles are not checked here; they are reported when activating.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        let dependencies = plugin.dependencies();

        let mut plugins = self.plugins.write();
        if plugins.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }

        info!("[Registry] Registering plugin {} (deps: {:?})", name, dependencies);

        let mut graph = self.graph.write();
        graph.add_plugin(&name);
        for dependency in &dependencies {
            graph.add_dependency(&name, dependency);
        }

        plugins.insert(
            name,
            PluginEntry {
                plugin,
                status: PluginStatus::Registered,
            },
        );
        Ok(())
    }

    /// Remove a plugin nothing else depends on, deactivating it first if
    /// it is active.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let (plugin, status) = {
            let plugins = self.plugins.read();
            let entry = plugins
                .get(name)
                .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
            (entry.plugin.clone(), entry.status)
        };

        let dependents: Vec<String> = {
            let plugins = self.plugins.read();
            self.graph
                .read()
                .get_dependents(name)
                .into_iter()
                .filter(|d| plugins.contains_key(d))
                .collect()
        };
        if !dependents.is_empty() {
            return Err(RegistryError::HasDependents {
                plugin: name.to_string(),
                dependents,
            });
        }

        if status.is_active() {
            if let Err(e) = plugin.deactivate().await {
                warn!("[Registry] ✗ {} failed to deactivate on removal: {}", name, e);
            }
        }

        self.plugins.write().remove(name);
        self.graph.write().remove_plugin(name);
        self.activated.lock().retain(|n| n != name);
        info!("[Registry] Unregistered plugin {}", name);
        Ok(())
    }

    /// Check the registered set can be activated.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let graph = self.graph.read();

        let cycle = graph.validate_dependencies();
        if !cycle.is_empty() {
            return Err(RegistryError::CyclicDependency { cycle });
        }

        if let Some((plugin, dependency)) = graph.missing_dependencies().into_iter().next() {
            return Err(RegistryError::MissingDependency { plugin, dependency });
        }

        Ok(())
    }

    /// Activate every inactive plugin, dependencies first.
    ///
    /// Stops at the first failure; plugins already brought up stay active.
    /// Returns the names activated by this call, in order.
    pub async fn activate_all(&self) -> Result<Vec<String>, RegistryError> {
        self.validate()?;

        let order = self
            .graph
            .read()
            .activation_order()
            .map_err(|cycle| RegistryError::CyclicDependency { cycle })?;

        info!("[Registry] Activation order: {:?}", order);

        let mut activated = Vec::new();
        for name in order {
            let Some(plugin) = self.begin_transition(&name, PluginStatus::Activating, false) else {
                continue;
            };

            info!("[Registry] Activating {}", name);
            match plugin.activate().await {
                Ok(()) => {
                    self.set_status(&name, PluginStatus::Active);
                    self.activated.lock().push(name.clone());
                    info!("[Registry] ✓ {} active", name);
                    activated.push(name);
                }
                Err(e) => {
                    self.set_status(&name, PluginStatus::Failed);
                    error!("[Registry] ✗ {} failed to activate: {}", name, e);
                    return Err(RegistryError::ActivationFailed {
                        plugin: name,
                        source: e,
                    });
                }
            }
        }

        info!("[Registry] All plugins active");
        Ok(activated)
    }

    /// Deactivate active plugins in reverse activation order.
    ///
    /// Every plugin is attempted even if some fail.
    pub async fn deactivate_all(&self) -> Result<(), RegistryError> {
        info!("[Registry] Deactivating all plugins");

        let order: Vec<String> = std::mem::take(&mut *self.activated.lock());
        let mut failed = Vec::new();

        for name in order.into_iter().rev() {
            let Some(plugin) = self.begin_transition(&name, PluginStatus::Deactivating, true) else {
                continue;
            };

            info!("[Registry] Deactivating {}", name);
            match plugin.deactivate().await {
                Ok(()) => {
                    self.set_status(&name, PluginStatus::Inactive);
                    info!("[Registry] ✓ {} deactivated", name);
                }
                Err(e) => {
                    self.set_status(&name, PluginStatus::Failed);
                    error!("[Registry] ✗ {} failed to deactivate cleanly: {}", name, e);
                    failed.push(name);
                }
            }
        }

        if failed.is_empty() {
            info!("[Registry] All plugins deactivated");
            Ok(())
        } else {
            Err(RegistryError::DeactivationFailed { plugins: failed })
        }
    }

    /// Move `name` into `next` if its current state allows it, returning the
    /// plugin to call outside the lock.
    fn begin_transition(
        &self,
        name: &str,
        next: PluginStatus,
        require_active: bool,
    ) -> Option<Arc<dyn Plugin>> {
        let mut plugins = self.plugins.write();
        let entry = plugins.get_mut(name)?;
        if entry.status.is_active() != require_active {
            return None;
        }
        entry.status = next;
        Some(entry.plugin.clone())
    }

    fn set_status(&self, name: &str, status: PluginStatus) {
        if let Some(entry) = self.plugins.write().get_mut(name) {
            entry.status = status;
        }
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.plugins.read().get(name).map(|e| e.status)
    }

    /// All plugins with their status, sorted by name.
    pub fn statuses(&self) -> Vec<(String, PluginStatus)> {
        let mut all: Vec<_> = self
            .plugins
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status))
            .collect();
        all.sort();
        all
    }

    /// Active plugins in activation order.
    pub fn active_plugins(&self) -> Vec<String> {
        self.activated.lock().clone()
    }

    pub fn active_count(&self) -> usize {
        self.activated.lock().len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().get(name).map(|e| e.plugin.clone())
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Plugins affected, directly or transitively, if `name` goes away.
    pub fn impact_of(&self, name: &str) -> Vec<String> {
        self.graph.read().get_all_dependents(name)
    }

    /// Copy of the current dependency graph.
    pub fn graph(&self) -> PluginDependencyGraph {
        self.graph.read().clone()
    }
}
