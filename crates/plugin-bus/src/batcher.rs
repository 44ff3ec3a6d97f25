//! # Event Batcher
//!
//! Accumulates events and hands them to a [`BatchProcessor`] as a group.
//!
//! ## Triggers
//!
//! - **Size**: the event that brings the queue to `max_size` flushes inline
//! - **Time**: a single timer flushes every `flush_interval`
//!
//! ## Failure Handling
//!
//! A failed batch is put back at the head of the queue, ahead of anything that
//! arrived while it was being processed, and the error is returned to whoever
//! triggered the flush. Retries are unbounded: a processor that always fails
//! grows the queue without limit.
//!
//! ## Timer
//!
//! The timer task is owned by the batcher and rescheduled after every flush
//! attempt. `stop()` waits for a flush already in progress before cancelling
//! the timer, so a batch the timer has taken is never dropped mid-process.
//! Drop aborts the timer unconditionally.

use async_trait::async_trait;
use parking_lot::Mutex;
use plugin_types::{Event, EventError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Batcher settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush.
    pub max_size: usize,
    /// Period of the time-based flush.
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            flush_interval: Duration::from_millis(1000),
        }
    }
}

/// Consumer of flushed batches.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Process one batch, in insertion order.
    async fn process(&self, batch: &[Event]) -> Result<(), EventError>;
}

struct BatcherInner {
    config: BatchConfig,
    processor: Arc<dyn BatchProcessor>,
    queue: Mutex<Vec<Event>>,
    running: AtomicBool,
    /// When the timer should next fire.
    deadline: Mutex<Instant>,
    /// Wakes the timer after the deadline moves.
    reschedule: Notify,
    /// Serializes flushes so batches reach the processor in queue order.
    flush_lock: tokio::sync::Mutex<()>,
}

impl BatcherInner {
    async fn flush(&self) -> Result<(), EventError> {
        let _guard = self.flush_lock.lock().await;

        let batch = std::mem::take(&mut *self.queue.lock());
        let result = if batch.is_empty() {
            Ok(())
        } else {
            debug!(size = batch.len(), "Flushing batch");
            self.processor.process(&batch).await
        };

        if let Err(e) = &result {
            let mut queue = self.queue.lock();
            let newer = std::mem::take(&mut *queue);
            warn!(
                error = %e,
                requeued = batch.len(),
                pending = newer.len(),
                "Batch failed, re-queued ahead of newer events"
            );
            *queue = batch;
            queue.extend(newer);
        }

        self.reschedule();
        result
    }

    fn reschedule(&self) {
        if self.running.load(Ordering::SeqCst) {
            *self.deadline.lock() = Instant::now() + self.config.flush_interval;
            self.reschedule.notify_one();
        }
    }
}

/// Size- and time-triggered event batcher.
pub struct EventBatcher {
    inner: Arc<BatcherInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl EventBatcher {
    pub fn new(config: BatchConfig, processor: Arc<dyn BatchProcessor>) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                config,
                processor,
                queue: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                deadline: Mutex::new(Instant::now()),
                reschedule: Notify::new(),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Start the flush timer. Calling it while running does nothing.
    ///
    /// # Errors
    ///
    /// Fails when called outside a Tokio runtime.
    pub fn start(&self) -> Result<(), EventError> {
        let mut timer = self.timer.lock();
        if self.inner.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| EventError::State {
            component: "EventBatcher",
            state: "outside a Tokio runtime",
        })?;

        self.inner.running.store(true, Ordering::SeqCst);
        *self.inner.deadline.lock() = Instant::now() + self.inner.config.flush_interval;
        *timer = Some(handle.spawn(run_timer(Arc::clone(&self.inner))));

        info!(
            max_size = self.inner.config.max_size,
            interval_ms = self.inner.config.flush_interval.as_millis() as u64,
            "Batcher started"
        );
        Ok(())
    }

    /// Queue an event, flushing inline when the queue reaches `max_size`.
    ///
    /// # Errors
    ///
    /// - Not running
    /// - The size-triggered flush failed (the event stays queued)
    pub async fn add_event(&self, event: Event) -> Result<(), EventError> {
        if !self.is_running() {
            return Err(EventError::not_running("EventBatcher"));
        }

        let should_flush = {
            let mut queue = self.inner.queue.lock();
            queue.push(event);
            queue.len() >= self.inner.config.max_size
        };

        if should_flush {
            self.inner.flush().await?;
        }
        Ok(())
    }

    /// Process everything queued now.
    pub async fn flush(&self) -> Result<(), EventError> {
        self.inner.flush().await
    }

    /// Cancel the timer and flush whatever is left.
    ///
    /// A timed flush already in progress completes first. Calling it while
    /// stopped does nothing.
    pub async fn stop(&self) -> Result<(), EventError> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        {
            // The timer only takes the queue while holding this lock.
            let _in_flight = self.inner.flush_lock.lock().await;
            if let Some(handle) = self.timer.lock().take() {
                handle.abort();
            }
        }

        let result = if self.pending_len() > 0 {
            self.inner.flush().await
        } else {
            Ok(())
        };

        info!(pending = self.pending_len(), "Batcher stopped");
        result
    }

    pub fn pending_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }
}

impl Drop for EventBatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_timer(inner: Arc<BatcherInner>) {
    loop {
        let deadline = *inner.deadline.lock();
        tokio::select! {
            _ = sleep_until(deadline) => {
                if let Err(e) = inner.flush().await {
                    warn!(error = %e, "Timed batch flush failed");
                }
            }
            _ = inner.reschedule.notified() => {}
        }
    }
}
