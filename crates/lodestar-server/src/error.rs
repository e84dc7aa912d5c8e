use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lodestar_core::{RegistryError, StoreError};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "Service instance not found")]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Service instance not found")]
    InstanceNotFound,

    #[error("No route for {0}")]
    RouteNotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InstanceNotFound | ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Registry(RegistryError::Store(StoreError::Unavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }
        (status, Json(ErrorBody { message: self.to_string() })).into_response()
    }
}
