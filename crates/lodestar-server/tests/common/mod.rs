#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use lodestar_core::{ManualClock, RegistryStore, ServiceRegistry, StoreError, DEFAULT_TTL};
use lodestar_db::MemoryStore;
use lodestar_server::{
    gateway::{Gateway, GatewayRoute},
    AppState,
};

pub struct TestApp {
    pub address: SocketAddr,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }
}

pub fn serve(app: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    address
}

/// Discovery service on a loopback port, backed by an in-memory store with a manual clock.
pub async fn spawn_app(routes: Vec<GatewayRoute>) -> TestApp {
    spawn_app_with_timeout(routes, Duration::from_secs(5)).await
}

pub async fn spawn_app_with_timeout(routes: Vec<GatewayRoute>, timeout: Duration) -> TestApp {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let registry = ServiceRegistry::with_clock(store, DEFAULT_TTL, clock.clone());
    let gateway = Gateway::new(routes, timeout).unwrap();

    let address = serve(lodestar_server::app(AppState::new(registry), Arc::new(gateway)));
    TestApp { address, clock }
}

/// Discovery service over an arbitrary store, without gateway routes.
pub fn spawn_with_store(store: Arc<dyn RegistryStore>) -> TestApp {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let registry = ServiceRegistry::with_clock(store, DEFAULT_TTL, clock.clone());
    let gateway = Gateway::new(Vec::new(), Duration::from_secs(5)).unwrap();

    let address = serve(lodestar_server::app(AppState::new(registry), Arc::new(gateway)));
    TestApp { address, clock }
}

/// Store whose backend is permanently unreachable.
pub struct UnreachableStore;

#[async_trait]
impl RegistryStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}
