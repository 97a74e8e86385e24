use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use shared::router_client::RouterError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    /// A bulk read or remote answer did not have the expected structure.
    #[error("invalid response shape: {0}")]
    InvalidResponseShape(String),
    #[error("{0}")]
    RemoteService(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

pub type Result<T> = std::result::Result<T, OpsError>;

impl From<RouterError> for OpsError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::InvalidShape => {
                OpsError::InvalidResponseShape("router response is not a JSON object".into())
            }
            RouterError::Parse(inner) => OpsError::InvalidResponseShape(inner.to_string()),
            RouterError::Remote(detail) => OpsError::RemoteService(detail),
            RouterError::Network(msg) => OpsError::RemoteService(msg),
        }
    }
}

impl OpsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OpsError::Unauthorized => StatusCode::UNAUTHORIZED,
            OpsError::NotFound(_) => StatusCode::NOT_FOUND,
            OpsError::Conflict(_) => StatusCode::CONFLICT,
            OpsError::Validation(_) => StatusCode::BAD_REQUEST,
            OpsError::InvalidResponseShape(_) | OpsError::RemoteService(_) => StatusCode::BAD_GATEWAY,
            OpsError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for OpsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_failures_map_to_bad_gateway() {
        let remote: OpsError = RouterError::Remote("no centroids for tenant".into()).into();
        assert_eq!(remote.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(remote.to_string(), "no centroids for tenant");

        let shape: OpsError = RouterError::InvalidShape.into();
        assert!(matches!(shape, OpsError::InvalidResponseShape(_)));
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(OpsError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(OpsError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
    }
}
