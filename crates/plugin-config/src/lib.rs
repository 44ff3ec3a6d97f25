//! # Plugin Config - Per-Plugin Configuration Manager
//!
//! One live configuration per plugin name, shaped by a registered schema.
//!
//! ## Write Path
//!
//! ```text
//! set_config(plugin, partial)
//!     │
//!     ├─→ merge over schema defaults (caller fields win)
//!     ├─→ middleware chain           (each step: Continue | Halt)
//!     ├─→ schema validation          (all field errors accumulated)
//!     ├─→ seal sensitive fields      (if an encryptor is configured)
//!     ├─→ middleware persist hooks   (stores see the sealed form)
//!     └─→ store + ConfigChange broadcast
//! ```
//!
//! On any failure the previous configuration stays in place.
//!
//! ## Read Path
//!
//! `get_config` opens sealed fields transparently and returns an empty map
//! for plugins that were never configured.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod encryption;
pub mod manager;
pub mod middleware;
pub mod store;
pub mod validation;

pub use encryption::{FieldEncryptor, ENCRYPTED_KEY};
pub use manager::{ConfigChange, ConfigManager, ConfigManagerConfig, ConfigStats};
pub use middleware::{
    ConfigContext, ConfigMiddleware, LoggingMiddleware, MiddlewareFlow, PersistenceMiddleware,
    ValidationMiddleware,
};
pub use store::{ConfigStore, InMemoryConfigStore, JsonFileConfigStore};
pub use validation::validate_config;

/// Capacity of the config change broadcast channel.
pub const DEFAULT_CHANGE_BUFFER: usize = 64;
