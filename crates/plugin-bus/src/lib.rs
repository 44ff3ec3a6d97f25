//! # Plugin Bus - Event Router for Plugin Communication
//!
//! Channel-based publish/subscribe with the delivery pipeline plugins rely on.
//!
//! ## Publish Pipeline
//!
//! ```text
//! publish(event)
//!     │
//!     ├─→ AsyncValidator        (structural + custom rules)
//!     ├─→ EventIdentityManager  (drop ids seen within the TTL window)
//!     ├─→ EventCompressor       (zstd+base64 above the size threshold)
//!     ├─→ EventHistory          (bounded ring buffer)
//!     │
//!     ├─→ EventBatcher ──┐      (batched mode: size or time trigger)
//!     │                  ▼
//!     └──────────→ EventRouter  (concurrent fan-out, aggregated failures)
//! ```
//!
//! ## Lifecycle
//!
//! Every component that owns a background timer (identity sweep, batch
//! flush) stores the task handle and aborts it on `stop()`/`destroy()` and on
//! drop.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod batcher;
pub mod bus;
pub mod compressor;
pub mod history;
pub mod identity;
pub mod router;
pub mod validator;

// Re-export main types
pub use batcher::{BatchConfig, BatchProcessor, EventBatcher};
pub use bus::{BusConfig, BusStats, EventBus, EventPublisher, PublishOutcome};
pub use compressor::{CompressionConfig, CompressionError, EventCompressor};
pub use history::EventHistory;
pub use identity::{EventIdentityManager, IdentityConfig};
pub use router::{handler_fn, EventHandler, EventRouter, RouterConfig, Subscription};
pub use validator::{AsyncValidator, ValidatorConfig};

/// Maximum channels a router accepts by default.
pub const DEFAULT_MAX_CHANNELS: usize = 100;

/// Maximum subscribers per channel by default.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 50;

/// Events retained in the history ring buffer by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
