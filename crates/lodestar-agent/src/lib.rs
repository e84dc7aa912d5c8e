//! Client side of the registry contract: register once, then heartbeat forever.

use std::time::Duration;

use lodestar_core::ServiceInstance;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to discovery service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discovery service answered {0}")]
    Status(StatusCode),

    #[error("invalid registration config: {0}")]
    Config(&'static str),
}

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub discovery_url: String,
    pub service_name: String,
    pub service_url: String,
    pub heartbeat_interval: Duration,
    pub register_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl RegistrationConfig {
    pub fn new(
        discovery_url: impl Into<String>,
        service_name: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            discovery_url: discovery_url.into().trim_end_matches('/').to_string(),
            service_name: service_name.into(),
            service_url: service_url.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            register_attempts: 5,
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Zero durations or attempts would stall or kill the heartbeat loop.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ClientError::Config("heartbeat interval must be greater than zero"));
        }
        if self.register_attempts == 0 {
            return Err(ClientError::Config("register attempts must be at least one"));
        }
        if self.retry_delay.is_zero() {
            return Err(ClientError::Config("retry delay must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config("request timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    name: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct InstanceBody<'a> {
    name: &'a str,
    id: Uuid,
}

#[derive(Deserialize)]
struct Registered {
    id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    Alive,
    /// The registry no longer knows this instance; register again.
    Unknown,
}

pub struct RegistrationClient {
    http: Client,
    config: RegistrationConfig,
}

impl RegistrationClient {
    pub fn new(config: RegistrationConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.discovery_url, path)
    }

    pub async fn register(&self) -> Result<Uuid, ClientError> {
        let response = self
            .http
            .post(self.endpoint("/register"))
            .json(&RegisterBody {
                name: &self.config.service_name,
                url: &self.config.service_url,
            })
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(ClientError::Status(response.status()));
        }
        let registered: Registered = response.json().await?;
        Ok(registered.id)
    }

    pub async fn heartbeat(&self, id: Uuid) -> Result<Heartbeat, ClientError> {
        let response = self
            .http
            .post(self.endpoint("/heartbeat"))
            .json(&InstanceBody {
                name: &self.config.service_name,
                id,
            })
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(Heartbeat::Alive),
            StatusCode::NOT_FOUND => Ok(Heartbeat::Unknown),
            other => Err(ClientError::Status(other)),
        }
    }

    pub async fn unregister(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint("/unregister"))
            .json(&InstanceBody {
                name: &self.config.service_name,
                id,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(())
    }

    /// Live instances of another service, for callers resolving peers.
    pub async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>, ClientError> {
        let response = self.http.get(self.endpoint(&format!("/{name}"))).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Up to `register_attempts` tries, `retry_delay` apart. `None` once exhausted.
    pub async fn register_with_retry(&self) -> Option<Uuid> {
        let attempts = self.config.register_attempts;
        for attempt in 1..=attempts {
            match self.register().await {
                Ok(id) => {
                    tracing::info!(service = %self.config.service_name, %id, "registered with discovery");
                    return Some(id);
                }
                Err(e) => {
                    tracing::warn!(
                        service = %self.config.service_name,
                        attempt,
                        attempts,
                        error = %e,
                        "registration failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        None
    }

    /// Registers, then heartbeats every interval until the task is dropped.
    ///
    /// If registration is exhausted the service keeps running undiscoverable
    /// and this returns without heartbeating.
    pub async fn run(self, current: watch::Sender<Option<Uuid>>) {
        let Some(mut id) = self.register_with_retry().await else {
            tracing::error!(
                service = %self.config.service_name,
                "giving up on registration, continuing without discovery"
            );
            return;
        };
        current.send_replace(Some(id));

        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        // The first tick completes immediately and registration just happened.
        interval.tick().await;
        loop {
            interval.tick().await;
            match self.heartbeat(id).await {
                Ok(Heartbeat::Alive) => {}
                Ok(Heartbeat::Unknown) => {
                    tracing::warn!(service = %self.config.service_name, %id, "registry forgot this instance, registering again");
                    match self.register().await {
                        Ok(fresh) => {
                            tracing::info!(service = %self.config.service_name, id = %fresh, "registered with discovery");
                            id = fresh;
                            current.send_replace(Some(id));
                        }
                        Err(e) => {
                            tracing::warn!(service = %self.config.service_name, error = %e, "re-registration failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(service = %self.config.service_name, %id, error = %e, "heartbeat failed");
                }
            }
        }
    }

    pub fn spawn(self) -> RegistrationHandle {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(self.run(tx));
        RegistrationHandle { id: rx, task }
    }
}

/// Running registration lifecycle. Dropping the handle does not stop it; `abort` does.
pub struct RegistrationHandle {
    id: watch::Receiver<Option<Uuid>>,
    task: JoinHandle<()>,
}

impl RegistrationHandle {
    /// Instance id currently held, if registration has succeeded.
    pub fn id(&self) -> Option<Uuid> {
        *self.id.borrow()
    }

    /// Subscribe to id changes (first registration and recoveries).
    pub fn watch(&self) -> watch::Receiver<Option<Uuid>> {
        self.id.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
