use chrono::{DateTime, Utc};
use serde::Serialize;

use convoy_core::ids::{ChatId, MessageId, OrgId, UserId};
use convoy_llm::types::Usage;
use convoy_rag::types::RagContext;

/// Input to `handle_turn`/`handle_rag_turn`, already past envelope
/// resolution (§4.E) — the gateway's extractor builds this from a
/// `RequestIdentity` plus the request body, this crate never sees a
/// header.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub chat_id: Option<ChatId>,
    pub message: String,
    pub correlation_id: String,
}

/// Response shape of a unary chat turn (§6 "Chat turn (unary)").
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurnOutcome {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub reply: String,
    pub created_at: DateTime<Utc>,
    pub usage: Usage,
}

/// Same as `ChatTurnOutcome`, with the RAG orchestrator's citation
/// context attached (§6 "RAG chat turn").
#[derive(Debug, Clone, Serialize)]
pub struct RagChatTurnOutcome {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub reply: String,
    pub created_at: DateTime<Utc>,
    pub usage: Usage,
    pub rag_context: RagContext,
}
