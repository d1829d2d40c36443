use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use convoy_core::error::ApiError;

/// Carries a correlation id alongside the error so every failure response
/// includes it (§7 "User-visible failures include correlation id"). Every
/// handler builds one of these at the point it first learns the request's
/// correlation id (the `Correlation` extractor, or the envelope extractors
/// which resolve it as part of identity resolution).
pub struct ApiErrorResponse {
    error: ApiError,
    correlation_id: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<ApiError>, correlation_id: impl Into<String>) -> Self {
        Self { error: error.into(), correlation_id: correlation_id.into() }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.error.into_body(&self.correlation_id);
        (status, Json(body)).into_response()
    }
}
