//! # Event Identity Manager
//!
//! Makes delivery idempotent within a time window.
//!
//! ## Design
//!
//! - Ids are recorded with the instant they were processed
//! - Entries older than the expiration window count as not processed and are
//!   evicted lazily on lookup
//! - A periodic sweep bounds memory for ids that are never looked up again
//! - `destroy()` aborts the sweep task; it is also aborted on drop

use parking_lot::Mutex;
use plugin_crypto::blake3_hex;
use plugin_types::Event;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

type ProcessedMap = Mutex<HashMap<String, Instant>>;

/// Identity manager settings.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// How long a processed id suppresses duplicates.
    pub expiration: Duration,
    /// Interval of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Generates identifiers and remembers recently processed ones.
pub struct EventIdentityManager {
    /// Map of event id -> instant it was marked processed.
    processed: Arc<ProcessedMap>,

    config: IdentityConfig,

    /// Periodic sweep task, if a runtime was available at construction.
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl EventIdentityManager {
    /// Hex characters in a deterministic id (128 bits).
    pub const DETERMINISTIC_ID_BYTES: usize = 16;

    /// Create a manager with default settings.
    pub fn new() -> Self {
        Self::with_config(IdentityConfig::default())
    }

    /// Create a manager with custom settings.
    ///
    /// The periodic sweep is spawned on the current Tokio runtime; outside a
    /// runtime only lazy eviction applies.
    pub fn with_config(config: IdentityConfig) -> Self {
        let processed = Arc::new(Mutex::new(HashMap::new()));

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(run_sweeper(
                Arc::downgrade(&processed),
                config.expiration,
                config.sweep_interval,
            ))),
            Err(_) => {
                debug!("No Tokio runtime, identity sweep disabled");
                None
            }
        };

        Self {
            processed,
            config,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Random unique identifier.
    pub fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Stable identifier derived from `input`.
    pub fn generate_deterministic_id(&self, input: &str) -> String {
        blake3_hex(input.as_bytes(), Self::DETERMINISTIC_ID_BYTES)
    }

    /// Deterministic identifier for an event's content.
    pub fn content_id(&self, event: &Event) -> String {
        self.generate_deterministic_id(&event.content_key())
    }

    /// Record `id` as processed now.
    pub fn mark_processed(&self, id: &str) {
        self.processed.lock().insert(id.to_string(), Instant::now());
    }

    /// Whether `id` was processed within the expiration window.
    ///
    /// An expired entry is evicted as a side effect.
    pub fn is_processed(&self, id: &str) -> bool {
        let mut processed = self.processed.lock();
        match processed.get(id) {
            Some(marked_at) if marked_at.elapsed() > self.config.expiration => {
                processed.remove(id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Whether `event` was already processed.
    pub fn is_duplicate(&self, event: &Event) -> bool {
        self.is_processed(&event.id)
    }

    /// Atomically check and record `id`.
    ///
    /// Returns `true` if the id was new (and is now recorded), `false` if it is
    /// a duplicate within the window.
    pub fn check_and_mark(&self, id: &str) -> bool {
        let mut processed = self.processed.lock();
        let now = Instant::now();

        if let Some(marked_at) = processed.get(id) {
            if now.saturating_duration_since(*marked_at) <= self.config.expiration {
                return false;
            }
        }

        processed.insert(id.to_string(), now);
        true
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.processed, self.config.expiration)
    }

    /// Number of tracked ids, expired or not.
    pub fn len(&self) -> usize {
        self.processed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.lock().is_empty()
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Stop the sweep and forget every id.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.processed.lock().clear();
        debug!("Identity manager destroyed");
    }

    /// Whether the background sweep is still scheduled.
    pub fn has_sweeper(&self) -> bool {
        self.sweeper.lock().is_some()
    }
}

impl Default for EventIdentityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventIdentityManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

fn sweep_expired(processed: &ProcessedMap, expiration: Duration) -> usize {
    let now = Instant::now();
    let mut processed = processed.lock();
    let before = processed.len();
    processed.retain(|_, marked_at| now.saturating_duration_since(*marked_at) <= expiration);
    before - processed.len()
}

async fn run_sweeper(processed: Weak<ProcessedMap>, expiration: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(processed) = processed.upgrade() else {
            return;
        };
        let removed = sweep_expired(&processed, expiration);
        if removed > 0 {
            debug!(removed = removed, "Swept expired event ids");
        }
    }
}
