//! Mapping of bundle errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bundlegen_core::BundleError;
use serde_json::json;
use tracing::error;

/// Handler error; renders as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub BundleError);

impl From<BundleError> for ApiError {
    fn from(err: BundleError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
