use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use lodestar_core::DEFAULT_TTL;

use crate::gateway::{self, GatewayRoute};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Redis { url: String },
    Memory,
}

/// Process configuration, read once at boot.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub store: StoreBackend,
    pub ttl: Duration,
    pub gateway_timeout: Duration,
    pub routes: Vec<GatewayRoute>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = parse_or(&lookup, "HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port = parse_or(&lookup, "PORT", 3001u16)?;

        let store = match lookup("STORE_BACKEND").as_deref() {
            None | Some("redis") => StoreBackend::Redis {
                url: match lookup("REDIS_URL") {
                    Some(url) => url,
                    None => lodestar_db::redis_url(
                        &lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                        parse_or(&lookup, "REDIS_PORT", 6379u16)?,
                        lookup("REDIS_PASSWORD").as_deref(),
                    ),
                },
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let ttl = positive_secs(&lookup, "REGISTRY_TTL_SECS", DEFAULT_TTL.as_secs())?;
        let gateway_timeout = positive_secs(&lookup, "GATEWAY_TIMEOUT_SECS", 30)?;

        Ok(Self {
            addr: SocketAddr::new(host, port),
            store,
            ttl,
            gateway_timeout,
            routes: gateway::routes_from_lookup(&lookup),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn positive_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
