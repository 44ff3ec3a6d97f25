//! Plugin lifecycle trait and status.

use crate::errors::PluginError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit the registry activates once its dependencies are active.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name, also used as the node name in the dependency graph.
    fn name(&self) -> &str;

    /// Names of plugins that must be active first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn activate(&self) -> Result<(), PluginError>;

    async fn deactivate(&self) -> Result<(), PluginError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PluginStatus {
    /// Known to the registry, never activated or deactivated since.
    Registered,
    Activating,
    Active,
    Deactivating,
    Inactive,
    /// The last lifecycle hook returned an error.
    Failed,
}

impl PluginStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
