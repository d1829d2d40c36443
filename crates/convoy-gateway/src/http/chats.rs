use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use convoy_core::error::ApiError;
use convoy_core::ids::ChatId;

use crate::app::AppState;
use crate::envelope_ext::{Correlation, Protected};
use crate::error::ApiErrorResponse;

/// GET /chats — every chat belonging to the caller's user within their org
/// (§6 "Chat list").
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
) -> impl IntoResponse {
    let result = state
        .repository
        .with_conn(|conn| convoy_repository::chats::list_for_user(conn, &identity.org_id, &identity.user_id));
    match result {
        Ok(chats) => Json(chats).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// GET /chats/{chat_id} — chat metadata plus its ordered messages (§6
/// "Chat get"). Tenant-scoped: a chat in another org reads back as 404,
/// never 403 (§7 "tenant isolation violations must be undetectable").
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    let chat_id = ChatId::from(chat_id);
    let result = state.repository.with_conn(|conn| {
        let chat = convoy_repository::chats::get(conn, &identity.org_id, &chat_id)?;
        let chat = match chat {
            Some(c) => c,
            None => return Ok(None),
        };
        let messages = convoy_repository::messages::list_for_chat(conn, &chat_id)?;
        Ok(Some(json!({ "chat": chat, "messages": messages })))
    });

    match result {
        Ok(Some(body)) => Json(body).into_response(),
        Ok(None) => ApiErrorResponse::new(ApiError::NotFound, correlation_id).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateChatBody {
    pub title: String,
}

/// PUT /chats/{chat_id} — rename a chat (§6 "Chat update/delete").
pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(chat_id): Path<String>,
    Json(body): Json<UpdateChatBody>,
) -> impl IntoResponse {
    let chat_id = ChatId::from(chat_id);
    let org_id = identity.org_id.clone();
    let result = state.repository.with_conn(|conn| {
        // rename() itself returns NotFound on a cross-tenant id, matching
        // get()'s tenant-scoped read (§7).
        convoy_repository::chats::rename(conn, &org_id, &chat_id, &body.title)
    });

    match result {
        Ok(()) => (axum::http::StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// DELETE /chats/{chat_id} — soft-delete a chat and cascade its messages
/// and summaries (§6 "Chat update/delete").
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    let chat_id = ChatId::from(chat_id);
    let org_id = identity.org_id.clone();
    let result = state.repository.with_conn_mut(|conn| convoy_repository::chats::soft_delete(conn, &org_id, &chat_id));

    match result {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}
