use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::envelope_ext::Protected;

/// GET /quota — supplemented endpoint (not in the distilled spec's route
/// list, but every other module exposes its own read surface and this is
/// the one piece of request-shaping state, §4.D, a caller has no other way
/// to observe before it gets a 429). Read-only: uses `QuotaEngine::peek`,
/// which never debits the bucket.
pub async fn peek_quota(State(state): State<Arc<AppState>>, Protected(identity): Protected) -> Json<convoy_quota::QuotaDecision> {
    Json(state.quota.peek(identity.org_id.as_str()).await)
}
