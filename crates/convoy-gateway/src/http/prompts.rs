use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use convoy_llm::prompts::PromptRegistry;

use crate::app::AppState;
use crate::envelope_ext::{Correlation, Protected};
use crate::error::ApiErrorResponse;

/// GET /prompts/{name} — every version of a named prompt (§6 "Prompt
/// list/get (all versions)").
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Protected(_identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let result = state.repository.with_conn(|conn| PromptRegistry::list_versions(conn, &name));
    match result {
        Ok(versions) => Json(versions).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptBody {
    pub content: String,
}

/// POST /prompts/{name} — create a new prompt version, admin-only (§6
/// "Prompt create (admin-only)"). `PromptRegistry::create_version` itself
/// enforces `Permission::CreatePrompt`, returning `Forbidden` for a
/// member caller.
pub async fn create_version(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(name): Path<String>,
    Json(body): Json<CreatePromptBody>,
) -> impl IntoResponse {
    let role = identity.role;
    let created_by = identity.user_id.as_str().to_string();
    let result = state
        .repository
        .with_conn_mut(|conn| PromptRegistry::create_version(conn, role, &name, &body.content, &created_by));
    match result {
        Ok(prompt) => (axum::http::StatusCode::CREATED, Json(prompt)).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivatePromptBody {
    pub version: u32,
}

/// POST /prompts/{name}/activate — activate a specific version, admin-only
/// (§6 "Prompt activate version (admin-only)").
pub async fn activate_version(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(name): Path<String>,
    Json(body): Json<ActivatePromptBody>,
) -> impl IntoResponse {
    let role = identity.role;
    let result = state
        .repository
        .with_conn_mut(|conn| PromptRegistry::activate_version(conn, role, &name, body.version));
    match result {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}
