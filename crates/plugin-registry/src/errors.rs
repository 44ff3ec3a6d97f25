//! Registry error types.

use thiserror::Error;

/// Failure reported by a plugin's own lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PluginError {
    pub message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Plugin '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Plugin '{0}' is not registered")]
    NotRegistered(String),

    /// The dependency relation contains a cycle; activation is refused.
    #[error("Cyclic plugin dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Plugin '{plugin}' depends on unregistered plugin '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Plugin '{plugin}' is required by: {}", .dependents.join(", "))]
    HasDependents {
        plugin: String,
        dependents: Vec<String>,
    },

    #[error("Plugin '{plugin}' failed to activate: {source}")]
    ActivationFailed {
        plugin: String,
        #[source]
        source: PluginError,
    },

    /// Every plugin was attempted; these failed.
    #[error("Plugins failed to deactivate: {}", .plugins.join(", "))]
    DeactivationFailed { plugins: Vec<String> },
}
