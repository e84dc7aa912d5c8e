use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::errors::RegistryError;
use crate::keys::{self, KEY_PREFIX};
use crate::store::RegistryStore;
use crate::time::{Clock, SystemClock};
use crate::ServiceInstance;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Directory of live service instances.
///
/// Liveness is delegated entirely to the store's key expiry: a record that
/// was not refreshed within `ttl` is simply gone, and nothing here sweeps
/// for stale entries.
#[derive(Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn RegistryStore>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self::with_clock(store, DEFAULT_TTL, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RegistryStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn register(&self, name: &str, url: &str) -> Result<Uuid, RegistryError> {
        let instance = ServiceInstance::new(name, url, self.clock.now_millis());
        self.write(&instance).await?;
        tracing::info!(service = name, id = %instance.id, url, "instance registered");
        Ok(instance.id)
    }

    pub async fn unregister(&self, name: &str, id: &Uuid) -> Result<(), RegistryError> {
        self.store.delete(&keys::instance_key(name, id)).await?;
        tracing::info!(service = name, %id, "instance unregistered");
        Ok(())
    }

    /// Refreshes the instance's expiry. `Ok(false)` means the instance is no
    /// longer known and the caller should register again.
    pub async fn heartbeat(&self, name: &str, id: &Uuid) -> Result<bool, RegistryError> {
        let key = keys::instance_key(name, id);
        let Some(mut instance) = self.read(&key).await? else {
            tracing::debug!(service = name, %id, "heartbeat for unknown instance");
            return Ok(false);
        };

        instance.update_heartbeat(self.clock.now_millis());
        self.write(&instance).await?;
        Ok(true)
    }

    pub async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let found = self.store.scan_prefix(&keys::service_prefix(name)).await?;
        let mut instances = Vec::with_capacity(found.len());
        for key in found {
            // Names may contain ':' so the prefix alone can overlap another service.
            if let Some(instance) = self.read(&key).await?.filter(|i| i.name == name) {
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    pub async fn get_all_services(
        &self,
    ) -> Result<HashMap<String, Vec<ServiceInstance>>, RegistryError> {
        let found = self.store.scan_prefix(KEY_PREFIX).await?;
        let mut services: HashMap<String, Vec<ServiceInstance>> = HashMap::new();
        for key in found {
            if let Some(instance) = self.read(&key).await? {
                services.entry(instance.name.clone()).or_default().push(instance);
            }
        }
        Ok(services)
    }

    async fn read(&self, key: &str) -> Result<Option<ServiceInstance>, RegistryError> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| RegistryError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn write(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let raw = serde_json::to_string(instance).map_err(RegistryError::Encode)?;
        self.store.set_with_ttl(&instance.key(), &raw, self.ttl).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store without expiry, enough to check encoding and error mapping.
    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, String>>,
        down: bool,
    }

    #[async_trait]
    impl RegistryStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.down {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set_with_ttl(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), StoreError> {
            if self.down {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn register_writes_json_record_under_composite_key() {
        let store = Arc::new(MapStore::default());
        let registry = ServiceRegistry::new(store.clone());

        let id = registry.register("auth", "http://host:3002").await.unwrap();

        let raw = store.get(&format!("service:auth:{id}")).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["url"], "http://host:3002");
        assert!(value["lastHeartbeat"].as_u64().is_some());
    }

    #[tokio::test]
    async fn discover_ignores_services_whose_name_extends_the_prefix() {
        let registry = ServiceRegistry::new(Arc::new(MapStore::default()));
        registry.register("api", "http://a").await.unwrap();
        registry.register("api:v2", "http://b").await.unwrap();

        let found = registry.discover("api").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "http://a");
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let store = Arc::new(MapStore::default());
        let id = Uuid::new_v4();
        store
            .set_with_ttl(&format!("service:auth:{id}"), "not json", DEFAULT_TTL)
            .await
            .unwrap();
        let registry = ServiceRegistry::new(store);

        let err = registry.discover("auth").await.unwrap_err();
        assert!(matches!(err, RegistryError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = Arc::new(MapStore {
            down: true,
            ..Default::default()
        });
        let registry = ServiceRegistry::new(store);

        let err = registry.register("auth", "http://host").await.unwrap_err();
        assert!(matches!(err, RegistryError::Store(StoreError::Unavailable(_))));
    }
}
