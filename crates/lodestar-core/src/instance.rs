use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A single live instance of a service class, as stored in the registry.
///
/// `last_heartbeat` is informational only. Whether an instance is live is
/// decided by the store's expiry clock, never by this timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: Uuid,
    #[schema(example = "auth")]
    pub name: String,
    /// Reachable base address of the instance
    #[schema(example = "http://auth:3002")]
    pub url: String,
    /// Milliseconds since the Unix epoch
    pub last_heartbeat: u64,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, url: impl Into<String>, last_heartbeat: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            last_heartbeat,
        }
    }

    pub fn update_heartbeat(&mut self, timestamp: u64) {
        self.last_heartbeat = timestamp;
    }

    pub fn key(&self) -> String {
        crate::keys::instance_key(&self.name, &self.id)
    }
}
