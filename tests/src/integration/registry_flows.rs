//! # Registry Flows
//!
//! Plugins that subscribe to the bus and read their config when activated,
//! driven by the registry in dependency order.

#[cfg(test)]
mod tests {
    use crate::fixtures::{config, event, service_schema, Recorder};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use plugin_bus::{BusConfig, EventBus, EventPublisher, PublishOutcome, Subscription};
    use plugin_config::ConfigManager;
    use plugin_registry::{Plugin, PluginError, PluginRegistry, PluginStatus, RegistryError};
    use serde_json::json;
    use std::sync::Arc;

    /// Subscribes a recorder to one channel while active.
    struct ListenerPlugin {
        name: String,
        deps: Vec<String>,
        channel: String,
        bus: Arc<EventBus>,
        recorder: Arc<Recorder>,
        subscription: Mutex<Option<Subscription>>,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl ListenerPlugin {
        fn new(
            name: &str,
            deps: &[&str],
            bus: &Arc<EventBus>,
            order: &Arc<Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                deps: deps.iter().map(|d| d.to_string()).collect(),
                channel: "events".to_string(),
                bus: bus.clone(),
                recorder: Recorder::new(),
                subscription: Mutex::new(None),
                order: order.clone(),
            })
        }
    }

    #[async_trait]
    impl Plugin for ListenerPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }

        async fn activate(&self) -> Result<(), PluginError> {
            let subscription = self
                .bus
                .subscribe(&self.channel, self.recorder.clone())
                .map_err(|e| PluginError::new(e.to_string()))?;
            *self.subscription.lock() = Some(subscription);
            self.order.lock().push(format!("+{}", self.name));
            Ok(())
        }

        async fn deactivate(&self) -> Result<(), PluginError> {
            if let Some(subscription) = self.subscription.lock().take() {
                subscription.unsubscribe();
            }
            self.order.lock().push(format!("-{}", self.name));
            Ok(())
        }
    }

    /// Refuses to activate without a readable config.
    struct ConfiguredPlugin {
        configs: Arc<ConfigManager>,
    }

    #[async_trait]
    impl Plugin for ConfiguredPlugin {
        fn name(&self) -> &str {
            "db"
        }

        async fn activate(&self) -> Result<(), PluginError> {
            if !self.configs.has_config("db") {
                return Err(PluginError::new("no configuration for db"));
            }
            let config = self
                .configs
                .get_config("db")
                .map_err(|e| PluginError::new(e.to_string()))?;
            if config.get("endpoint").is_none() {
                return Err(PluginError::new("endpoint missing"));
            }
            Ok(())
        }

        async fn deactivate(&self) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn started_bus() -> Arc<EventBus> {
        let bus = Arc::new(EventBus::new(BusConfig::default()));
        bus.start().unwrap();
        bus.register_channel("events").unwrap();
        bus
    }

    #[tokio::test]
    async fn test_plugins_subscribe_in_order_and_unsubscribe_in_reverse() {
        let bus = started_bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = PluginRegistry::new();

        let ui = ListenerPlugin::new("ui", &["search", "storage"], &bus, &order);
        let search = ListenerPlugin::new("search", &["storage"], &bus, &order);
        let storage = ListenerPlugin::new("storage", &[], &bus, &order);
        registry.register(ui.clone()).unwrap();
        registry.register(search.clone()).unwrap();
        registry.register(storage.clone()).unwrap();

        registry.activate_all().await.unwrap();
        assert_eq!(
            bus.publish(event("events", "APP.STARTED")).await.unwrap(),
            PublishOutcome::Delivered { handlers: 3 }
        );
        assert_eq!(ui.recorder.len(), 1);

        registry.deactivate_all().await.unwrap();
        assert_eq!(
            *order.lock(),
            vec!["+storage", "+search", "+ui", "-ui", "-search", "-storage"]
        );
        assert_eq!(
            bus.publish(event("events", "APP.STOPPED")).await.unwrap(),
            PublishOutcome::Delivered { handlers: 0 }
        );
    }

    #[tokio::test]
    async fn test_cycle_leaves_bus_untouched() {
        let bus = started_bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = PluginRegistry::new();
        registry
            .register(ListenerPlugin::new("a", &["b"], &bus, &order))
            .unwrap();
        registry
            .register(ListenerPlugin::new("b", &["a"], &bus, &order))
            .unwrap();

        let err = registry.activate_all().await.unwrap_err();

        assert!(matches!(err, RegistryError::CyclicDependency { .. }));
        assert!(order.lock().is_empty());
        assert_eq!(bus.router().subscriber_count("events"), Some(0));
    }

    #[tokio::test]
    async fn test_activation_waits_for_valid_config() {
        let bus = started_bus();
        let configs = Arc::new(ConfigManager::default());
        configs.register_schema("db", service_schema());
        let order = Arc::new(Mutex::new(Vec::new()));

        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(ConfiguredPlugin {
                configs: configs.clone(),
            }))
            .unwrap();
        let api = ListenerPlugin::new("api", &["db"], &bus, &order);
        registry.register(api.clone()).unwrap();

        let err = registry.activate_all().await.unwrap_err();
        assert!(matches!(err, RegistryError::ActivationFailed { ref plugin, .. } if plugin == "db"));
        assert_eq!(registry.status("api"), Some(PluginStatus::Registered));

        // A rejected write does not unblock activation
        let rejected = configs.set_config("db", config(json!({"retries": 3}))).await;
        assert!(!rejected.is_valid);
        assert!(registry.activate_all().await.is_err());

        let accepted = configs
            .set_config("db", config(json!({"endpoint": "postgres://db"})))
            .await;
        assert!(accepted.is_valid);

        let activated = registry.activate_all().await.unwrap();
        assert_eq!(activated, vec!["db".to_string(), "api".to_string()]);
        assert_eq!(bus.router().subscriber_count("events"), Some(1));
    }

    #[tokio::test]
    async fn test_impact_of_removing_a_plugin() {
        let bus = started_bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = PluginRegistry::new();
        for (name, deps) in [
            ("storage", vec![]),
            ("search", vec!["storage"]),
            ("ui", vec!["search"]),
            ("metrics", vec![]),
        ] {
            registry
                .register(ListenerPlugin::new(name, &deps, &bus, &order))
                .unwrap();
        }

        assert_eq!(registry.impact_of("storage"), vec!["search", "ui"]);
        assert!(registry.impact_of("metrics").is_empty());

        let graph = registry.graph();
        assert!(graph.validate_dependencies().is_empty());
        assert_eq!(
            graph.activation_order().unwrap(),
            vec!["metrics", "storage", "search", "ui"]
        );
    }
}
