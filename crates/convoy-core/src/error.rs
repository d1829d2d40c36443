use serde::Serialize;
use thiserror::Error;

/// The HTTP-facing error taxonomy shared by every component. Individual
/// crates define their own narrower error enums and convert into this one
/// at the boundary where an HTTP status is finally needed (the gateway).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing or invalid identity")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("quota exhausted, retry after reset")]
    QuotaExhausted { reset_at: chrono::DateTime<chrono::Utc> },

    #[error("upstream failure: {message}")]
    Upstream { message: String, fallback_attempted: bool },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("service degraded: {0}")]
    Degraded(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::QuotaExhausted { .. } => "QUOTA_EXHAUSTED",
            ApiError::Upstream { .. } => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Degraded(_) => "DEGRADED",
        }
    }

    /// The status a gateway route should answer with. Kept here rather than
    /// in the gateway crate so every caller of this enum agrees on the
    /// mapping without depending on axum.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthenticated => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound => 404,
            ApiError::QuotaExhausted { .. } => 429,
            // §6 only sanctions {200,201,400,401,403,404,429,500,503} —
            // an upstream provider/vector/storage failure stays within
            // that set rather than answering 502.
            ApiError::Upstream { .. } => 500,
            ApiError::Internal(_) => 500,
            ApiError::Degraded(_) => 503,
        }
    }
}

/// Wire shape for an error response body, always carrying the correlation
/// id so a caller can hand it back for post-hoc debugging (§7).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_attempted: Option<bool>,
}

impl ApiError {
    pub fn into_body(self, correlation_id: &str) -> ErrorBody {
        let reset_at = match &self {
            ApiError::QuotaExhausted { reset_at } => Some(*reset_at),
            _ => None,
        };
        let fallback_attempted = match &self {
            ApiError::Upstream { fallback_attempted, .. } => Some(*fallback_attempted),
            _ => None,
        };
        ErrorBody {
            error: self.to_string(),
            code: self.code(),
            correlation_id: correlation_id.to_string(),
            reset_at,
            fallback_attempted,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
