use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use transit_domain::SpawnError;

use crate::model::ErrorBody;

/// Wraps [`SpawnError`] so it can be returned directly from an axum handler.
/// Maps the error taxonomy from spec §7 onto status codes: `Validation` and
/// `Geometry` (bad route/polyline input) are 4xx, `Spatial`/`Persistence`
/// are 5xx, `Authorization` is 401, everything else is a generic 500 with
/// the detail kept server-side in the log line.
pub struct ApiError(pub SpawnError);

impl From<SpawnError> for ApiError {
    fn from(err: SpawnError) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(SpawnError::Internal(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            SpawnError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            SpawnError::Geometry(_) => (StatusCode::NOT_FOUND, "geometry_error"),
            SpawnError::Config(_) => (StatusCode::BAD_REQUEST, "config_error"),
            SpawnError::Authorization(_) => (StatusCode::UNAUTHORIZED, "authorization_error"),
            SpawnError::Spatial(_) => (StatusCode::BAD_GATEWAY, "spatial_error"),
            SpawnError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
            SpawnError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            error: code.to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
