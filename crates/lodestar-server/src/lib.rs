//! Service discovery API and static reverse-proxy gateway.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use lodestar_core::ServiceRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::ApiDoc;
use crate::gateway::Gateway;

/// Paths served by the discovery service itself; gateway prefixes may not cover them.
pub const RESERVED_PATHS: &[&str] = &[
    "/register",
    "/unregister",
    "/heartbeat",
    "/services",
    "/health",
    "/metrics",
    "/swagger-ui",
    "/api-docs",
];

#[derive(Clone)]
pub struct AppState {
    pub registry: ServiceRegistry,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }
}

/// Discovery routes with the gateway in front of them.
pub fn app(state: AppState, gateway: Arc<Gateway>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::health_check))
        .route("/metrics", get(api::metrics))
        .route("/register", post(api::register))
        .route("/unregister", post(api::unregister))
        .route("/heartbeat", post(api::heartbeat))
        .route("/services", get(api::list_services))
        .route("/:service_name", get(api::discover))
        .fallback(api::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(gateway, gateway::proxy)),
        )
        .with_state(state)
}
