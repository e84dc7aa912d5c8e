use std::sync::Arc;

use lodestar_core::{RegistryStore, ServiceRegistry, SystemClock};
use lodestar_db::{MemoryStore, RedisStore};
use lodestar_server::{
    config::{Config, StoreBackend},
    gateway::Gateway,
    AppState,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok();

    let config = Config::from_env()?;

    let store: Arc<dyn RegistryStore> = match &config.store {
        StoreBackend::Redis { url } => {
            let store = RedisStore::connect(url).await?;
            store.ping().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; registrations are not shared between processes");
            Arc::new(MemoryStore::new())
        }
    };
    let registry = ServiceRegistry::with_clock(store, config.ttl, Arc::new(SystemClock));

    let gateway = Gateway::new(config.routes.clone(), config.gateway_timeout)?;
    tracing::info!(routes = gateway.routes().len(), "gateway routes installed");

    let state = AppState {
        registry,
        metrics: Some(handle),
    };
    let app = lodestar_server::app(state, Arc::new(gateway));

    tracing::info!("listening on {}", config.addr);
    axum::Server::bind(&config.addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
