//! # Config Manager Flows
//!
//! Writes through the middleware chain into a file store, with sensitive
//! fields sealed at rest, and back out again after a restart.

#[cfg(test)]
mod tests {
    use crate::fixtures::{config, service_schema};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use plugin_config::{
        ConfigContext, ConfigManager, ConfigManagerConfig, ConfigMiddleware, ConfigStore,
        FieldEncryptor, JsonFileConfigStore, LoggingMiddleware, MiddlewareFlow,
        PersistenceMiddleware, ValidationMiddleware, ENCRYPTED_KEY,
    };
    use plugin_crypto::{Cipher, SecretKey};
    use plugin_types::ConfigErrorCode;
    use serde_json::json;
    use std::sync::Arc;

    const KEY: [u8; 32] = [42; 32];

    fn manager(cipher: Cipher) -> ConfigManager {
        let manager = ConfigManager::new(ConfigManagerConfig::default())
            .with_encryption(FieldEncryptor::new(cipher, SecretKey::from_bytes(KEY)));
        manager.register_schema("db", service_schema());
        manager
    }

    /// Records the config each time it is called.
    struct Tap {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ConfigMiddleware for Tap {
        fn name(&self) -> &str {
            "tap"
        }

        async fn handle(&self, ctx: &mut ConfigContext<'_>) -> MiddlewareFlow {
            self.seen.lock().push(ctx.plugin.to_string());
            MiddlewareFlow::Continue
        }
    }

    #[tokio::test]
    async fn test_file_store_holds_only_sealed_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileConfigStore::open(dir.path()).await.unwrap());

        let manager = manager(Cipher::XChaCha20Poly1305);
        manager.use_middleware(Arc::new(LoggingMiddleware));
        manager.use_middleware(Arc::new(PersistenceMiddleware::new(store.clone())));

        let result = manager
            .set_config(
                "db",
                config(json!({"endpoint": "postgres://db", "password": "hunter2"})),
            )
            .await;
        assert!(result.is_valid, "{:?}", result.errors);

        let raw = std::fs::read_to_string(dir.path().join("db.json")).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(raw.contains(ENCRYPTED_KEY));
        assert!(raw.contains("postgres://db"));

        let plain = manager.get_config("db").unwrap();
        assert_eq!(plain["password"], "hunter2");
        assert_eq!(plain["retries"], 3);
    }

    #[tokio::test]
    async fn test_restart_reloads_from_store() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = Arc::new(JsonFileConfigStore::open(dir.path()).await.unwrap());
            let manager = manager(Cipher::Aes256Gcm);
            manager.use_middleware(Arc::new(PersistenceMiddleware::new(store)));
            let result = manager
                .set_config(
                    "db",
                    config(json!({"endpoint": "postgres://db", "password": "pw", "retries": 5})),
                )
                .await;
            assert!(result.is_valid);
        }

        let store = JsonFileConfigStore::open(dir.path()).await.unwrap();
        let restarted = manager(Cipher::Aes256Gcm);
        assert!(!restarted.has_config("db"));

        let result = restarted.load_from_store(&store, "db").await;
        assert!(result.is_valid, "{:?}", result.errors);
        let plain = restarted.get_config("db").unwrap();
        assert_eq!(plain["password"], "pw");
        assert_eq!(plain["retries"], 5);
    }

    #[tokio::test]
    async fn test_reload_with_wrong_key_fails() {
        let store = Arc::new(plugin_config::InMemoryConfigStore::new());
        let writer = manager(Cipher::XChaCha20Poly1305);
        writer.use_middleware(Arc::new(PersistenceMiddleware::new(store.clone())));
        writer
            .set_config("db", config(json!({"endpoint": "e", "password": "pw"})))
            .await;

        let reader = ConfigManager::new(ConfigManagerConfig::default()).with_encryption(
            FieldEncryptor::new(Cipher::XChaCha20Poly1305, SecretKey::from_bytes([1; 32])),
        );
        reader.register_schema("db", service_schema());
        let result = reader.load_from_store(store.as_ref(), "db").await;

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, ConfigErrorCode::DecryptionError);
        assert!(!reader.has_config("db"));
    }

    #[tokio::test]
    async fn test_invalid_write_is_never_persisted() {
        let store = Arc::new(plugin_config::InMemoryConfigStore::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(Cipher::XChaCha20Poly1305);
        manager.use_middleware(Arc::new(Tap { seen: seen.clone() }));
        manager.use_middleware(Arc::new(ValidationMiddleware::new()));
        manager.use_middleware(Arc::new(PersistenceMiddleware::new(store.clone())));

        let result = manager
            .set_config("db", config(json!({"retries": 50})))
            .await;

        assert!(!result.is_valid);
        assert_eq!(result.errors_for("endpoint").count(), 1);
        assert_eq!(result.errors_for("retries").count(), 1);
        assert_eq!(*seen.lock(), vec!["db".to_string()]);
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(manager.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_notifies() {
        let manager = manager(Cipher::XChaCha20Poly1305);
        let mut changes = manager.subscribe_changes();

        manager
            .set_config("db", config(json!({"endpoint": "a", "password": "pw"})))
            .await;
        let result = manager
            .update_config("db", config(json!({"endpoint": "b"})))
            .await;
        assert!(result.is_valid);

        let plain = manager.get_config("db").unwrap();
        assert_eq!(plain["endpoint"], "b");
        assert_eq!(plain["password"], "pw");

        let first = changes.recv().await.unwrap();
        let second = changes.recv().await.unwrap();
        assert_eq!(first.plugin, "db");
        assert!(second.keys.contains(&"endpoint".to_string()));

        assert!(manager.clear_config("db").await.unwrap());
        assert!(changes.recv().await.unwrap().keys.is_empty());
        assert!(manager.get_config("db").unwrap().is_empty());
    }
}
