//! # Event Bus Flows
//!
//! End-to-end behavior of the publish pipeline:
//!
//! ```text
//! publish ─→ validate ─→ dedup ─→ compress ─→ history ─→ [batcher] ─→ route ─→ handlers
//! ```

#[cfg(test)]
mod tests {
    use crate::fixtures::{event, large_event, Failing, Recorder};
    use futures::future::join_all;
    use plugin_bus::{
        BatchConfig, BusConfig, EventBus, EventCompressor, EventPublisher, IdentityConfig,
        PublishOutcome,
    };
    use plugin_types::{codes, Event, EventError, PredicateRule};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn bus(config: BusConfig) -> EventBus {
        let bus = EventBus::new(config);
        bus.start().unwrap();
        bus.register_channel("orders").unwrap();
        bus.register_channel("audit").unwrap();
        bus
    }

    // =========================================================================
    // IMMEDIATE MODE
    // =========================================================================

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_once() {
        let bus = bus(BusConfig::default());
        let first = Recorder::new();
        let second = Recorder::new();
        let other = Recorder::new();
        bus.subscribe("orders", first.clone()).unwrap();
        bus.subscribe("orders", second.clone()).unwrap();
        bus.subscribe("audit", other.clone()).unwrap();

        let outcome = bus.publish(event("orders", "ORDER.CREATED")).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Delivered { handlers: 2 });
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(other.is_empty());
        assert_eq!(bus.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_republished_event_is_suppressed() {
        let bus = bus(BusConfig::default());
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let event = event("orders", "ORDER.CREATED");
        bus.publish(event.clone()).await.unwrap();
        let outcome = bus.publish(event.clone()).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Duplicate);
        assert_eq!(recorder.ids(), vec![event.id]);
        assert_eq!(bus.stats().duplicates, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_republish_delivers_once() {
        let bus = Arc::new(bus(BusConfig::default()));
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let event = event("orders", "ORDER.CREATED");
        let tasks = (0..16).map(|_| {
            let bus = bus.clone();
            let event = event.clone();
            tokio::spawn(async move { bus.publish(event).await.unwrap() })
        });
        let outcomes: Vec<PublishOutcome> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, PublishOutcome::Delivered { .. }))
            .count();
        assert_eq!(delivered, 1);
        assert_eq!(recorder.len(), 1);
        assert_eq!(bus.stats().duplicates, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_window_expires() {
        let config = BusConfig {
            identity: IdentityConfig {
                expiration: Duration::from_secs(1),
                ..IdentityConfig::default()
            },
            ..BusConfig::default()
        };
        let bus = bus(config);
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let event = event("orders", "ORDER.CREATED");
        bus.publish(event.clone()).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(
            bus.publish(event).await.unwrap(),
            PublishOutcome::Delivered { handlers: 1 }
        );
        assert_eq!(recorder.len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_disabled_delivers_twice() {
        let bus = bus(BusConfig {
            enable_deduplication: false,
            ..BusConfig::default()
        });
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let event = event("orders", "ORDER.CREATED");
        bus.publish(event.clone()).await.unwrap();
        bus.publish(event).await.unwrap();

        assert_eq!(recorder.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_event_rejected_before_delivery() {
        let bus = bus(BusConfig::default());
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let invalid = Event {
            event_type: String::new(),
            timestamp: -5,
            ..event("orders", "ORDER.CREATED")
        };

        match bus.publish(invalid).await {
            Err(EventError::Validation(result)) => {
                assert_eq!(result.errors.len(), 2);
                assert!(result.has_code(codes::REQUIRED));
                assert!(result.has_code(codes::INVALID_TIMESTAMP));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(recorder.is_empty());
        assert_eq!(bus.stats().rejected, 1);
        assert!(bus.history(None, 10).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_event_is_not_marked_processed() {
        let bus = bus(BusConfig::default());
        bus.validator().add_rule(Arc::new(PredicateRule::new(
            "data.amount",
            "NEGATIVE_AMOUNT",
            "amount must not be negative",
            |e: &Event| Ok(e.data["amount"].as_i64().map_or(true, |a| a >= 0)),
        )));
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let mut event = event("orders", "ORDER.CREATED");
        event.data = json!({ "amount": -1 });
        assert!(bus.publish(event.clone()).await.is_err());

        // Same id, now valid
        event.data = json!({ "amount": 10 });
        assert_eq!(
            bus.publish(event).await.unwrap(),
            PublishOutcome::Delivered { handlers: 1 }
        );
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let bus = bus(BusConfig::default());
        let recorder = Recorder::new();
        bus.subscribe("orders", Failing::new("inventory offline")).unwrap();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let err = bus.publish(event("orders", "ORDER.CREATED")).await.unwrap_err();

        match err {
            EventError::Delivery { channel, failures } => {
                assert_eq!(channel, "orders");
                assert_eq!(failures, vec!["inventory offline".to_string()]);
            }
            other => panic!("expected delivery error, got {:?}", other),
        }
        assert_eq!(recorder.len(), 1);
        assert_eq!(bus.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_large_payload_compressed_in_transit() {
        let bus = bus(BusConfig::default());
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let original = large_event("orders", 8 * 1024);
        bus.publish(original.clone()).await.unwrap();

        let received = recorder.events().remove(0);
        assert!(EventCompressor::is_compressed(&received.data));
        assert_eq!(bus.decompress(&received).unwrap().data, original.data);
    }

    #[tokio::test]
    async fn test_history_by_channel() {
        let bus = bus(BusConfig::default());
        for i in 0..3 {
            bus.publish(event("orders", &format!("ORDER.STEP_{}", i)))
                .await
                .unwrap();
        }
        bus.publish(event("audit", "AUDIT.ENTRY")).await.unwrap();

        let orders = bus.history(Some("orders"), 2);
        let types: Vec<&str> = orders.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["ORDER.STEP_1", "ORDER.STEP_2"]);
        assert_eq!(bus.history(None, 10).len(), 4);
    }

    #[tokio::test]
    async fn test_publish_after_stop_fails() {
        let bus = bus(BusConfig::default());
        bus.stop().await.unwrap();

        let err = bus.publish(event("orders", "ORDER.CREATED")).await.unwrap_err();
        assert!(err.is_not_running());
    }

    // =========================================================================
    // BATCHED MODE
    // =========================================================================

    fn batched(max_size: usize) -> BusConfig {
        BusConfig::default().with_batching(BatchConfig {
            max_size,
            flush_interval: Duration::from_millis(100),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_on_interval_in_order() {
        let bus = bus(batched(100));
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        let events: Vec<Event> = (0..3).map(|_| event("orders", "ORDER.CREATED")).collect();
        for e in &events {
            assert_eq!(bus.publish(e.clone()).await.unwrap(), PublishOutcome::Queued);
        }
        assert!(recorder.is_empty());
        assert_eq!(bus.pending(), 3);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let expected: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(recorder.ids(), expected);
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_when_full() {
        let bus = bus(batched(2));
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        bus.publish(event("orders", "ORDER.CREATED")).await.unwrap();
        assert!(recorder.is_empty());
        bus.publish(event("orders", "ORDER.CREATED")).await.unwrap();

        assert_eq!(recorder.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_pending_batch() {
        let bus = bus(batched(100));
        let recorder = Recorder::new();
        bus.subscribe("orders", recorder.clone()).unwrap();

        bus.publish(event("orders", "ORDER.CREATED")).await.unwrap();
        bus.stop().await.unwrap();

        assert_eq!(recorder.len(), 1);
        assert!(!bus.is_running());
    }
}
