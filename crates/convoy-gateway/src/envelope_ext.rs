use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use convoy_envelope::{correlation_id, resolve_identity, HeaderLookup, RequestIdentity};

use crate::app::AppState;
use crate::error::ApiErrorResponse;

/// Bridges `axum::http::HeaderMap` into `convoy_envelope::HeaderLookup`
/// (§4.E) — the only place in this workspace that couples the envelope to
/// a specific web framework.
struct AxumHeaders<'a>(&'a axum::http::HeaderMap);

impl HeaderLookup for AxumHeaders<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Extractor for routes that require identity (every route but the health
/// probe, metrics, and document search's public preview, per §6). 401/403
/// on failure, with the request's correlation id attached to the error
/// body (§7).
pub struct Protected(pub RequestIdentity);

impl FromRequestParts<Arc<AppState>> for Protected {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let headers = AxumHeaders(&parts.headers);
        let corr = correlation_id(&headers).as_str().to_string();
        let identity = resolve_identity(&state.repository, &headers, false)
            .map_err(|e| ApiErrorResponse::new(e, corr.clone()))?;
        identity
            .map(Protected)
            .ok_or_else(|| ApiErrorResponse::new(convoy_core::error::ApiError::Unauthenticated, corr))
    }
}

/// Extractor for the health probe — identity is optional, never rejects.
pub struct OptionalIdentity(pub Option<RequestIdentity>);

impl FromRequestParts<Arc<AppState>> for OptionalIdentity {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let headers = AxumHeaders(&parts.headers);
        let corr = correlation_id(&headers).as_str().to_string();
        let identity = resolve_identity(&state.repository, &headers, true)
            .map_err(|e| ApiErrorResponse::new(e, corr))?;
        Ok(OptionalIdentity(identity))
    }
}

/// The request's correlation id alone, for handlers that need it before
/// (or independent of) identity resolution. Never rejects — a missing or
/// malformed `x-request-id` just means one is minted (§4.E step 1).
pub struct Correlation(pub String);

impl<S> FromRequestParts<S> for Correlation
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = AxumHeaders(&parts.headers);
        Ok(Correlation(correlation_id(&headers).as_str().to_string()))
    }
}
