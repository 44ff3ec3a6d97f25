//! # Plugin Registry - Dependency Graph and Lifecycle
//!
//! Tracks which plugins depend on which and activates them in a safe order.
//!
//! ## Features
//!
//! - **Cycle detection**: three-color DFS returns the offending cycle
//! - **Dependency ordering**: dependencies activate first, deactivate last
//! - **Impact queries**: direct and transitive dependents of a plugin
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = PluginRegistry::new();
//!
//! registry.register(Arc::new(StoragePlugin::new()))?;
//! registry.register(Arc::new(SearchPlugin::new()))?; // depends on "storage"
//!
//! // Refuses cyclic or incomplete plugin sets
//! registry.activate_all().await?;
//!
//! registry.deactivate_all().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod errors;
pub mod graph;
pub mod plugin;
pub mod registry;

pub use errors::{PluginError, RegistryError};
pub use graph::PluginDependencyGraph;
pub use plugin::{Plugin, PluginStatus};
pub use registry::PluginRegistry;
