//! # Event Router
//!
//! Owns named channels and fans each routed event out to every subscriber.
//!
//! ## State Machine
//!
//! ```text
//! stopped ──start()──→ running ──stop()──→ stopped
//! ```
//!
//! Registering, subscribing and routing require `running`. `stop()` clears
//! every channel; fan-outs already in flight finish on their own.
//!
//! ## Fan-out
//!
//! Handlers start in subscription order and run concurrently. Every handler
//! runs to completion (or timeout) before `route` returns; failures are
//! aggregated into a single [`EventError::Delivery`].

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use plugin_types::{ChannelError, Event, EventError, HandlerError};
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives events routed to a channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        (self.0)(event).await
    }
}

/// Wrap an async closure as a handler.
///
/// ```rust
/// use plugin_bus::handler_fn;
///
/// let handler = handler_fn(|event| async move {
///     println!("got {}", event.event_type);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Router limits.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub max_channels: usize,
    pub max_subscribers_per_channel: usize,
    /// Per-handler time limit. `None` waits indefinitely.
    pub handler_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_channels: crate::DEFAULT_MAX_CHANNELS,
            max_subscribers_per_channel: crate::DEFAULT_MAX_SUBSCRIBERS,
            handler_timeout: None,
        }
    }
}

struct Subscriber {
    id: u64,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct RouterState {
    running: bool,
    /// Channel name -> subscribers in subscription order.
    channels: BTreeMap<String, Vec<Subscriber>>,
}

/// Channel-based publish/subscribe router.
pub struct EventRouter {
    config: RouterConfig,
    state: Arc<RwLock<RouterState>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(RouterState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// # Errors
    ///
    /// Fails if already running.
    pub fn start(&self) -> Result<(), EventError> {
        let mut state = self.state.write();
        if state.running {
            return Err(EventError::already_running("EventRouter"));
        }
        state.running = true;
        info!("Event router started");
        Ok(())
    }

    /// Stop accepting work and drop every channel and subscriber.
    pub fn stop(&self) {
        let mut state = self.state.write();
        if !state.running {
            return;
        }
        state.running = false;
        let channels = state.channels.len();
        state.channels.clear();
        info!(channels = channels, "Event router stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// # Errors
    ///
    /// - Not running
    /// - Name already registered
    /// - Channel cap reached
    pub fn register_channel(&self, name: &str) -> Result<(), EventError> {
        let mut state = self.state.write();
        if !state.running {
            return Err(EventError::not_running("EventRouter"));
        }
        if state.channels.contains_key(name) {
            return Err(ChannelError::AlreadyExists(name.to_string()).into());
        }
        if state.channels.len() >= self.config.max_channels {
            return Err(ChannelError::MaxChannels {
                max: self.config.max_channels,
            }
            .into());
        }

        state.channels.insert(name.to_string(), Vec::new());
        info!(channel = %name, "Channel registered");
        Ok(())
    }

    /// Remove a channel and all of its subscribers.
    pub fn unregister_channel(&self, name: &str) -> Result<(), EventError> {
        let mut state = self.state.write();
        if !state.running {
            return Err(EventError::not_running("EventRouter"));
        }
        match state.channels.remove(name) {
            Some(subscribers) => {
                info!(channel = %name, subscribers = subscribers.len(), "Channel unregistered");
                Ok(())
            }
            None => Err(ChannelError::NotFound(name.to_string()).into()),
        }
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.state.read().channels.contains_key(name)
    }

    /// Registered channel names, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        self.state.read().channels.keys().cloned().collect()
    }

    /// Subscribers on `channel`, `None` if it does not exist.
    pub fn subscriber_count(&self, channel: &str) -> Option<usize> {
        self.state.read().channels.get(channel).map(Vec::len)
    }

    /// Attach `handler` to `channel`.
    ///
    /// # Errors
    ///
    /// - Not running
    /// - Channel does not exist
    /// - Subscriber cap reached
    /// - The same handler is already subscribed to this channel
    pub fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, EventError> {
        let mut state = self.state.write();
        if !state.running {
            return Err(EventError::not_running("EventRouter"));
        }

        let max = self.config.max_subscribers_per_channel;
        let subscribers = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| ChannelError::NotFound(channel.to_string()))?;

        if subscribers.len() >= max {
            return Err(EventError::Subscription {
                channel: channel.to_string(),
                reason: format!("Maximum subscribers reached ({})", max),
            });
        }

        let handler_ptr = Arc::as_ptr(&handler) as *const ();
        if subscribers
            .iter()
            .any(|s| Arc::as_ptr(&s.handler) as *const () == handler_ptr)
        {
            return Err(EventError::Subscription {
                channel: channel.to_string(),
                reason: "Handler is already subscribed".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.push(Subscriber { id, handler });
        debug!(channel = %channel, subscription_id = id, "Subscribed");

        Ok(Subscription {
            id,
            channel: channel.to_string(),
            active: AtomicBool::new(true),
            state: Arc::downgrade(&self.state),
        })
    }

    /// Deliver `event` to every subscriber of `channel`.
    ///
    /// Returns the number of handlers invoked.
    ///
    /// # Errors
    ///
    /// - Not running
    /// - Channel does not exist
    /// - One or more handlers failed, timed out or panicked (after all ran)
    pub async fn route(
        &self,
        channel: &str,
        event: impl Into<Arc<Event>>,
    ) -> Result<usize, EventError> {
        let event = event.into();

        let handlers: Vec<Arc<dyn EventHandler>> = {
            let state = self.state.read();
            if !state.running {
                return Err(EventError::not_running("EventRouter"));
            }
            state
                .channels
                .get(channel)
                .ok_or_else(|| ChannelError::NotFound(channel.to_string()))?
                .iter()
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        let invoked = handlers.len();
        let timeout = self.config.handler_timeout;

        let outcomes = join_all(
            handlers
                .into_iter()
                .map(|handler| invoke(handler, Arc::clone(&event), channel, timeout)),
        )
        .await;

        let failures: Vec<String> = outcomes.into_iter().filter_map(Result::err).collect();

        if failures.is_empty() {
            debug!(channel = %channel, event_id = %event.id, handlers = invoked, "Event routed");
            Ok(invoked)
        } else {
            warn!(
                channel = %channel,
                event_id = %event.id,
                failed = failures.len(),
                handlers = invoked,
                "Event delivery failed"
            );
            Err(EventError::Delivery {
                channel: channel.to_string(),
                failures,
            })
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

async fn invoke(
    handler: Arc<dyn EventHandler>,
    event: Arc<Event>,
    channel: &str,
    timeout: Option<Duration>,
) -> Result<(), String> {
    let call = AssertUnwindSafe(handler.handle(event)).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(EventError::Timeout {
                    channel: channel.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
                .to_string())
            }
        },
        None => call.await,
    };

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.message),
        Err(panic) => Err(format!("Handler panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Disposable handle returned by [`EventRouter::subscribe`].
///
/// Dropping it leaves the handler subscribed; call
/// [`Subscription::unsubscribe`] to detach.
pub struct Subscription {
    id: u64,
    channel: String,
    active: AtomicBool,
    state: Weak<RwLock<RouterState>>,
}

impl Subscription {
    /// Detach the handler.
    ///
    /// Safe to call more than once, after the router stopped, or after the
    /// router was dropped.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(state) = self.state.upgrade() else {
            return;
        };

        let mut state = state.write();
        if !state.running {
            return;
        }
        if let Some(subscribers) = state.channels.get_mut(&self.channel) {
            subscribers.retain(|s| s.id != self.id);
            debug!(channel = %self.channel, subscription_id = self.id, "Unsubscribed");
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether `unsubscribe` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    fn running_router() -> EventRouter {
        let router = EventRouter::default();
        router.start().unwrap();
        router
    }

    fn event(channel: &str) -> Event {
        Event::builder("TEST.EVENT", channel).data(json!({})).build()
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        handler_fn(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let router = running_router();
        let err = router.start().unwrap_err();
        assert!(matches!(err, EventError::State { state: "already running", .. }));
    }

    #[tokio::test]
    async fn test_operations_require_running() {
        let router = EventRouter::default();

        assert!(router.register_channel("a").unwrap_err().is_not_running());
        assert!(router
            .subscribe("a", counting_handler(Arc::default()))
            .unwrap_err()
            .is_not_running());
        assert!(router.route("a", event("a")).await.unwrap_err().is_not_running());
    }

    #[tokio::test]
    async fn test_register_channel_twice_fails() {
        let router = running_router();
        router.register_channel("users").unwrap();

        let err = router.register_channel("users").unwrap_err();
        assert!(matches!(err, EventError::Channel(ChannelError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_max_channels() {
        let router = EventRouter::new(RouterConfig {
            max_channels: 2,
            ..Default::default()
        });
        router.start().unwrap();
        router.register_channel("a").unwrap();
        router.register_channel("b").unwrap();

        let err = router.register_channel("c").unwrap_err();
        assert!(matches!(
            err,
            EventError::Channel(ChannelError::MaxChannels { max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_subscribe_unknown_channel_fails() {
        let router = running_router();
        let err = router
            .subscribe("missing", counting_handler(Arc::default()))
            .unwrap_err();
        assert!(matches!(err, EventError::Channel(ChannelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_max_subscribers() {
        let router = EventRouter::new(RouterConfig {
            max_subscribers_per_channel: 1,
            ..Default::default()
        });
        router.start().unwrap();
        router.register_channel("a").unwrap();
        router.subscribe("a", counting_handler(Arc::default())).unwrap();

        let err = router
            .subscribe("a", counting_handler(Arc::default()))
            .unwrap_err();
        assert!(matches!(err, EventError::Subscription { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_handler_rejected() {
        let router = running_router();
        router.register_channel("a").unwrap();
        router.register_channel("b").unwrap();
        let handler = counting_handler(Arc::default());

        router.subscribe("a", handler.clone()).unwrap();
        assert!(router.subscribe("a", handler.clone()).is_err());
        // Same handler on another channel is fine
        assert!(router.subscribe("b", handler).is_ok());
    }

    #[tokio::test]
    async fn test_n_events_m_subscribers() {
        let router = running_router();
        router.register_channel("users").unwrap();

        let counters: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::default()).collect();
        for counter in &counters {
            router
                .subscribe("users", counting_handler(counter.clone()))
                .unwrap();
        }

        for _ in 0..10 {
            assert_eq!(router.route("users", event("users")).await.unwrap(), 4);
        }

        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 10);
        }
    }

    #[tokio::test]
    async fn test_handlers_start_in_subscription_order() {
        let router = running_router();
        router.register_channel("c").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            router
                .subscribe(
                    "c",
                    handler_fn(move |_| {
                        order.lock().push(i);
                        async { Ok(()) }
                    }),
                )
                .unwrap();
        }

        router.route("c", event("c")).await.unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlers_run_concurrently() {
        let router = running_router();
        router.register_channel("c").unwrap();
        for _ in 0..3 {
            router
                .subscribe(
                    "c",
                    handler_fn(|_| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(())
                    }),
                )
                .unwrap();
        }

        let started = Instant::now();
        router.route("c", event("c")).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_failures_aggregated_without_short_circuit() {
        let router = running_router();
        router.register_channel("c").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        router
            .subscribe("c", handler_fn(|_| async { Err(HandlerError::new("first broke")) }))
            .unwrap();
        router.subscribe("c", counting_handler(counter.clone())).unwrap();
        router
            .subscribe("c", handler_fn(|_| async { Err(HandlerError::new("third broke")) }))
            .unwrap();

        let err = router.route("c", event("c")).await.unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        match err {
            EventError::Delivery { channel, failures } => {
                assert_eq!(channel, "c");
                assert_eq!(failures, vec!["first broke", "third broke"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_a_failure() {
        let router = running_router();
        router.register_channel("c").unwrap();
        router
            .subscribe(
                "c",
                handler_fn(|event| async move {
                    if event.data.is_object() {
                        panic!("handler exploded");
                    }
                    Ok(())
                }),
            )
            .unwrap();

        let err = router.route("c", event("c")).await.unwrap_err();
        assert!(err.to_string().contains("handler exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout() {
        let router = EventRouter::new(RouterConfig {
            handler_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        router.start().unwrap();
        router.register_channel("c").unwrap();
        router
            .subscribe(
                "c",
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }),
            )
            .unwrap();

        let err = router.route("c", event("c")).await.unwrap_err();
        assert!(err.to_string().contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let router = running_router();
        router.register_channel("c").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let sub = router.subscribe("c", counting_handler(counter.clone())).unwrap();

        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert_eq!(router.subscriber_count("c"), Some(0));
        assert_eq!(router.route("c", event("c")).await.unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_after_stop_is_noop() {
        let router = running_router();
        router.register_channel("c").unwrap();
        let sub = router.subscribe("c", counting_handler(Arc::default())).unwrap();

        router.stop();
        sub.unsubscribe();

        drop(router);
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_stop_clears_channels_and_allows_restart() {
        let router = running_router();
        router.register_channel("c").unwrap();

        router.stop();
        assert!(!router.is_running());
        assert!(router.channel_names().is_empty());

        router.start().unwrap();
        router.register_channel("c").unwrap();
        assert!(router.has_channel("c"));
    }

    #[tokio::test]
    async fn test_unregister_channel() {
        let router = running_router();
        router.register_channel("b").unwrap();
        router.register_channel("a").unwrap();
        assert_eq!(router.channel_names(), vec!["a", "b"]);

        router.unregister_channel("a").unwrap();
        assert!(!router.has_channel("a"));
        assert!(matches!(
            router.unregister_channel("a").unwrap_err(),
            EventError::Channel(ChannelError::NotFound(_))
        ));
    }
}
