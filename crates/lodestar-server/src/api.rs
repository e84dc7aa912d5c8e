use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use lodestar_core::ServiceInstance;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        register,
        unregister,
        heartbeat,
        list_services,
        discover,
        health_check,
    ),
    components(
        schemas(
            RegisterRequest,
            RegisterResponse,
            InstanceRef,
            HeartbeatResponse,
            ErrorBody,
            ServiceInstance,
        )
    )
)]
pub struct ApiDoc;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "auth")]
    pub name: String,
    #[schema(example = "http://auth:3002")]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub name: String,
    pub url: String,
}

/// Body of unregister and heartbeat calls.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InstanceRef {
    #[schema(example = "auth")]
    pub name: String,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HeartbeatResponse {
    #[schema(example = "ok")]
    pub status: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

fn require_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("name must be a non-empty string".into()));
    }
    Ok(())
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require_name(&self.name)?;
        match Url::parse(&self.url) {
            Ok(url) if url.has_host() => Ok(()),
            _ => Err(ApiError::Validation(format!("url {:?} is not a valid URL", self.url))),
        }
    }
}

impl InstanceRef {
    /// `Ok(None)` for an id that is well-formed input but cannot name any instance.
    fn validate(&self) -> Result<Option<Uuid>, ApiError> {
        require_name(&self.name)?;
        if self.id.trim().is_empty() {
            return Err(ApiError::Validation("id must be a non-empty string".into()));
        }
        Ok(Uuid::parse_str(self.id.trim()).ok())
    }
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Instance registered", body = RegisterResponse),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 503, description = "Registry store unavailable", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = body(payload)?;
    payload.validate()?;

    let id = state.registry.register(&payload.name, &payload.url).await?;
    metrics::counter!("lodestar_registrations_total").increment(1);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            name: payload.name,
            url: payload.url,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/unregister",
    request_body = InstanceRef,
    responses(
        (status = 204, description = "Instance removed (or was already gone)"),
        (status = 400, description = "Malformed request", body = ErrorBody)
    )
)]
pub async fn unregister(
    State(state): State<AppState>,
    payload: Result<Json<InstanceRef>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let payload = body(payload)?;
    if let Some(id) = payload.validate()? {
        state.registry.unregister(&payload.name, &id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/heartbeat",
    request_body = InstanceRef,
    responses(
        (status = 200, description = "Expiry refreshed", body = HeartbeatResponse),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 404, description = "Instance unknown or expired, register again", body = ErrorBody)
    )
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    payload: Result<Json<InstanceRef>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let payload = body(payload)?;
    let alive = match payload.validate()? {
        Some(id) => state.registry.heartbeat(&payload.name, &id).await?,
        None => false,
    };

    let outcome = if alive { "ok" } else { "unknown" };
    metrics::counter!("lodestar_heartbeats_total", "outcome" => outcome).increment(1);

    if !alive {
        return Err(ApiError::InstanceNotFound);
    }
    Ok(Json(HeartbeatResponse {
        status: "ok".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/services",
    responses(
        (status = 200, description = "Live instances grouped by service name")
    )
)]
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, Vec<ServiceInstance>>>, ApiError> {
    Ok(Json(state.registry.get_all_services().await?))
}

#[utoipa::path(
    get,
    path = "/{service_name}",
    responses((status = 200, description = "Live instances of the service", body = Vec<ServiceInstance>)),
    params(("service_name" = String, Path, description = "Service name"))
)]
pub async fn discover(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
) -> Result<Json<Vec<ServiceInstance>>, ApiError> {
    Ok(Json(state.registry.discover(&service_name).await?))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "OK"))
)]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound(uri.path().to_string())
}
