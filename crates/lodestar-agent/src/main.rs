use std::time::Duration;

use lodestar_agent::{RegistrationClient, RegistrationConfig, DEFAULT_HEARTBEAT_INTERVAL};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn required(key: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(key).map_err(|_| format!("{key} must be set").into())
}

fn secs(key: &str, default: Duration) -> Result<Duration, Box<dyn std::error::Error>> {
    match std::env::var(key) {
        Ok(raw) => Ok(Duration::from_secs(
            raw.trim().parse().map_err(|_| format!("invalid value for {key}: {raw:?}"))?,
        )),
        Err(_) => Ok(default),
    }
}

/// Sidecar that keeps a co-located service registered with discovery.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let discovery_url = std::env::var("LODESTAR_DISCOVERY_URL")
        .unwrap_or_else(|_| "http://localhost:3001".to_string());
    let mut config = RegistrationConfig::new(discovery_url, required("SERVICE_NAME")?, required("SERVICE_URL")?);
    config.heartbeat_interval = secs("HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL)?;
    config.retry_delay = secs("REGISTER_RETRY_DELAY_SECS", config.retry_delay)?;
    if let Ok(raw) = std::env::var("REGISTER_ATTEMPTS") {
        config.register_attempts = raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid value for REGISTER_ATTEMPTS: {raw:?}"))?;
    }

    let handle = RegistrationClient::new(config)?.spawn();

    shutdown_signal().await;
    tracing::info!(id = ?handle.id(), "shutting down; instance will age out of the registry");
    handle.abort();
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
}
