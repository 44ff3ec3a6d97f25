//! # Event Bus
//!
//! Facade composing the validator, identity manager, compressor, history,
//! optional batcher and router into one publish pipeline.
//!
//! ## Ordering
//!
//! An id is marked processed once it passes validation, before delivery. A
//! republished id inside the window is reported as
//! [`PublishOutcome::Duplicate`] even if its first delivery failed.

use crate::batcher::{BatchConfig, BatchProcessor, EventBatcher};
use crate::compressor::{CompressionConfig, EventCompressor};
use crate::history::EventHistory;
use crate::identity::{EventIdentityManager, IdentityConfig};
use crate::router::{EventHandler, EventRouter, RouterConfig, Subscription};
use crate::validator::{AsyncValidator, ValidatorConfig};
use async_trait::async_trait;
use plugin_types::{ChannelError, Event, EventError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Bus composition and pipeline switches.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub router: RouterConfig,
    pub validator: ValidatorConfig,
    pub identity: IdentityConfig,
    pub compression: CompressionConfig,
    /// `Some` routes through an [`EventBatcher`]; `None` delivers immediately.
    pub batch: Option<BatchConfig>,
    pub enable_validation: bool,
    pub enable_deduplication: bool,
    pub enable_compression: bool,
    pub history_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            validator: ValidatorConfig::default(),
            identity: IdentityConfig::default(),
            compression: CompressionConfig::default(),
            batch: None,
            enable_validation: true,
            enable_deduplication: true,
            enable_compression: true,
            history_capacity: crate::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Route through a batcher.
    pub fn with_batching(mut self, batch: BatchConfig) -> Self {
        self.batch = Some(batch);
        self
    }
}

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Routed immediately to this many handlers.
    Delivered { handlers: usize },
    /// Accepted by the batcher.
    Queued,
    /// Id already processed inside the identity window; skipped.
    Duplicate,
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Publish attempts while running.
    pub published: u64,
    /// Events routed with every handler succeeding.
    pub delivered: u64,
    /// Routing attempts where at least one handler failed.
    pub failed: u64,
    /// Events skipped as duplicates.
    pub duplicates: u64,
    /// Events rejected by validation.
    pub rejected: u64,
}

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
}

impl BusCounters {
    fn snapshot(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Interface plugins use to emit events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event through the pipeline.
    async fn publish(&self, event: Event) -> Result<PublishOutcome, EventError>;

    /// Total publish attempts.
    fn events_published(&self) -> u64;
}

/// Routes each batched event in insertion order.
struct RouterBatchProcessor {
    router: Arc<EventRouter>,
    counters: Arc<BusCounters>,
}

#[async_trait]
impl BatchProcessor for RouterBatchProcessor {
    async fn process(&self, batch: &[Event]) -> Result<(), EventError> {
        let mut failures = Vec::new();

        for event in batch {
            match self.router.route(&event.channel, event.clone()).await {
                Ok(_) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(EventError::Channel(ChannelError::NotFound(channel))) => {
                    // Unregistered after queueing; a retry cannot succeed.
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(event_id = %event.id, channel = %channel, "Dropping batched event for removed channel");
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    failures.push(format!("{}: {}", event.id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EventError::Batch(failures.join("; ")))
        }
    }
}

/// The publish pipeline.
pub struct EventBus {
    config: BusConfig,
    running: AtomicBool,
    router: Arc<EventRouter>,
    validator: AsyncValidator,
    identity: EventIdentityManager,
    compressor: EventCompressor,
    batcher: Option<EventBatcher>,
    history: EventHistory,
    counters: Arc<BusCounters>,
}

impl EventBus {
    /// Build a stopped bus.
    ///
    /// Call inside a Tokio runtime so the identity sweep can be scheduled.
    pub fn new(config: BusConfig) -> Self {
        let router = Arc::new(EventRouter::new(config.router.clone()));
        let counters = Arc::new(BusCounters::default());

        let batcher = config.batch.clone().map(|batch| {
            EventBatcher::new(
                batch,
                Arc::new(RouterBatchProcessor {
                    router: Arc::clone(&router),
                    counters: Arc::clone(&counters),
                }),
            )
        });

        Self {
            validator: AsyncValidator::new(config.validator.clone()),
            identity: EventIdentityManager::with_config(config.identity.clone()),
            compressor: EventCompressor::new(config.compression.clone()),
            history: EventHistory::new(config.history_capacity),
            running: AtomicBool::new(false),
            router,
            batcher,
            counters,
            config,
        }
    }

    /// # Errors
    ///
    /// - Already running
    /// - Batching enabled outside a Tokio runtime
    pub fn start(&self) -> Result<(), EventError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(EventError::already_running("EventBus"));
        }

        self.router.start()?;
        if let Some(batcher) = &self.batcher {
            if let Err(e) = batcher.start() {
                self.router.stop();
                return Err(e);
            }
        }
        self.validator.start();
        self.running.store(true, Ordering::SeqCst);

        info!(
            batched = self.batcher.is_some(),
            validation = self.config.enable_validation,
            deduplication = self.config.enable_deduplication,
            compression = self.config.enable_compression,
            "Event bus started"
        );
        Ok(())
    }

    /// Flush the batcher, then stop the router and validator and destroy the
    /// identity manager.
    ///
    /// Teardown completes even when the final flush fails; that error is
    /// returned afterwards.
    pub async fn stop(&self) -> Result<(), EventError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let flushed = match &self.batcher {
            Some(batcher) => batcher.stop().await,
            None => Ok(()),
        };
        if let Err(e) = &flushed {
            error!(error = %e, "Final batch flush failed");
        }

        self.router.stop();
        self.validator.stop();
        self.identity.destroy();

        info!(stats = ?self.stats(), "Event bus stopped");
        flushed
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn register_channel(&self, name: &str) -> Result<(), EventError> {
        self.router.register_channel(name)
    }

    pub fn unregister_channel(&self, name: &str) -> Result<(), EventError> {
        self.router.unregister_channel(name)
    }

    pub fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, EventError> {
        self.router.subscribe(channel, handler)
    }

    /// Flush the batcher now. Does nothing in immediate mode.
    pub async fn flush(&self) -> Result<(), EventError> {
        match &self.batcher {
            Some(batcher) => batcher.flush().await,
            None => Ok(()),
        }
    }

    /// Copy of `event` with its payload decompressed.
    pub fn decompress(&self, event: &Event) -> Result<Event, EventError> {
        let data = self
            .compressor
            .decompress(&event.data)
            .map_err(|e| EventError::Compression(e.to_string()))?;
        Ok(Event {
            data,
            ..event.clone()
        })
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn history(&self, channel: Option<&str>, limit: usize) -> Vec<Arc<Event>> {
        self.history.recent(channel, limit)
    }

    pub fn stats(&self) -> BusStats {
        self.counters.snapshot()
    }

    /// Events waiting in the batcher.
    pub fn pending(&self) -> usize {
        self.batcher.as_ref().map_or(0, EventBatcher::pending_len)
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn validator(&self) -> &AsyncValidator {
        &self.validator
    }

    pub fn identity(&self) -> &EventIdentityManager {
        &self.identity
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, mut event: Event) -> Result<PublishOutcome, EventError> {
        if !self.is_running() {
            return Err(EventError::not_running("EventBus"));
        }
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        if self.config.enable_validation {
            let result = self.validator.validate(&event).await;
            if !result.is_valid {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(event_id = %event.id, errors = %result.summary(), "Event rejected");
                return Err(EventError::Validation(result));
            }
        }

        // Checked up front so batched mode rejects the same events immediate
        // mode does, before the id is marked processed.
        if !self.router.has_channel(&event.channel) {
            debug!(event_id = %event.id, channel = %event.channel, "Publish to unknown channel");
            return Err(ChannelError::NotFound(event.channel).into());
        }

        if self.config.enable_deduplication && !self.identity.check_and_mark(&event.id) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(event_id = %event.id, "Duplicate event skipped");
            return Ok(PublishOutcome::Duplicate);
        }

        if self.config.enable_compression {
            event.data = self.compressor.compress(&event.data);
        }

        let event = Arc::new(event);
        self.history.push(Arc::clone(&event));

        if let Some(batcher) = &self.batcher {
            batcher.add_event(Event::clone(&event)).await?;
            return Ok(PublishOutcome::Queued);
        }

        let channel = event.channel.clone();
        match self.router.route(&channel, event).await {
            Ok(handlers) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(PublishOutcome::Delivered { handlers })
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }
}
