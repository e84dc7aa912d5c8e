use std::time::Duration;

use async_trait::async_trait;

use crate::errors::StoreError;

/// Minimal key-value surface the registry needs: per-key expiry plus prefix enumeration.
///
/// Every operation touches a single key (or a scan), so implementations only
/// need the single-key atomicity their backend already provides.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` and replaces any previous expiry with `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Live keys starting with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
