use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::app::AppState;
use crate::envelope_ext::Correlation;

/// GET /health — public liveness probe (§6). Checks the two storage
/// dependencies this process owns directly; provider reachability is
/// reported separately (best-effort, never flips the overall status) since
/// a down LLM provider degrades answer quality, not the server's own
/// health.
pub async fn health_handler(State(state): State<Arc<AppState>>, Correlation(request_id): Correlation) -> impl IntoResponse {
    let database_ok = state.repository.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(()))).is_ok();
    let kv_ok = state.kv.ping().await.is_ok();

    let healthy = database_ok && kv_ok;
    let status = if healthy { "ok" } else { "degraded" };
    let http_status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let providers: Vec<_> = state
        .health
        .all_entries()
        .into_iter()
        .map(|e| json!({ "name": e.name, "status": e.status, "avg_latency_ms": e.avg_latency_ms }))
        .collect();

    let env = std::env::var("CONVOY_ENV").unwrap_or_else(|_| "development".to_string());

    let body = json!({
        "status": status,
        "services": {
            "database": if database_ok { "ok" } else { "down" },
            "kv": if kv_ok { "ok" } else { "down" },
        },
        "providers": providers,
        "env": env,
        "timestamp": chrono::Utc::now(),
        "requestId": request_id,
    });

    (http_status, Json(body))
}
