use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use convoy_core::ids::ChatId;
use convoy_chatservice::types::ChatTurnRequest;

use crate::app::AppState;
use crate::envelope_ext::{Correlation, Protected};
use crate::error::ApiErrorResponse;

/// Body shared by every chat turn variant (§6 "Chat turn (unary)").
#[derive(Debug, Deserialize)]
pub struct ChatTurnBody {
    pub message: String,
    pub chat_id: Option<String>,
}

fn build_request(identity: &convoy_envelope::RequestIdentity, body: ChatTurnBody, correlation_id: String) -> ChatTurnRequest {
    ChatTurnRequest {
        org_id: identity.org_id.clone(),
        user_id: identity.user_id.clone(),
        chat_id: body.chat_id.map(ChatId::from),
        message: body.message,
        correlation_id,
    }
}

/// POST /chat — unary chat turn.
pub async fn chat_turn(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Json(body): Json<ChatTurnBody>,
) -> impl IntoResponse {
    let req = build_request(&identity, body, correlation_id.clone());
    match state.chat_service.handle_turn(req).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// POST /chat/stream — streaming chat turn (§4.H, §6).
pub async fn chat_turn_streaming(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Json(body): Json<ChatTurnBody>,
) -> impl IntoResponse {
    let req = build_request(&identity, body, correlation_id.clone());
    match state.chat_service.handle_turn_streaming(req).await {
        Ok(sse) => sse.into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// POST /chat/rag — unary RAG-augmented chat turn (§4.K, §6).
pub async fn rag_turn(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Json(body): Json<ChatTurnBody>,
) -> impl IntoResponse {
    let req = build_request(&identity, body, correlation_id.clone());
    match state.chat_service.handle_rag_turn(req).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// POST /chat/rag/stream — streaming RAG-augmented chat turn.
pub async fn rag_turn_streaming(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Json(body): Json<ChatTurnBody>,
) -> impl IntoResponse {
    let req = build_request(&identity, body, correlation_id.clone());
    match state.chat_service.handle_rag_turn_streaming(req).await {
        Ok(sse) => sse.into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}
