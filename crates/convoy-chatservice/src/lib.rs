pub mod types;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::response::sse::{Event, Sse};
use chrono::Utc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use convoy_core::config::MAX_MESSAGE_CHARS;
use convoy_core::error::{ApiError, Result};
use convoy_core::ids::ChatId;
use convoy_llm::types::Message as LlmMessage;
use convoy_llm::{EmbeddingProvider, LlmProvider, ProviderRouter};
use convoy_memory::MemoryEngine;
use convoy_quota::QuotaEngine;
use convoy_rag::retrieve::{prepare_stream_turn, retrieve_and_answer, RagRetriever};
use convoy_repository::types::MessageRole;
use convoy_repository::Repository;
use convoy_streaming::turn::{stream_chat_turn, StreamTurnContext};
use convoy_vectorindex::VectorIndex;

use crate::types::{ChatTurnOutcome, ChatTurnRequest, RagChatTurnOutcome};

/// Prompt name passed to (G) for an ordinary chat turn — distinct from
/// `summarization` so a summarization call can never be mistaken for a
/// user-facing reply (§4.F "distinct prompt name" guard).
const CHAT_PROMPT_NAME: &str = "chat";
const DEFAULT_TITLE_CHARS: usize = 40;

/// The local embedding provider plus the vector backend — held together
/// because RAG is only available when both are configured (§9 "K
/// optionally"). `RagRetriever` itself is constructed per request since it
/// is scoped to a single org id (the only public constructor in `convoy_rag`
/// that can attach a tenant filter).
pub struct RagComponents {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_index: Arc<dyn VectorIndex>,
}

/// The entry point of a chat turn (§4.M, Module M). Holds handles to every
/// component a turn touches: (A) via `Repository`, (D) via `QuotaEngine`,
/// (F) via `MemoryEngine`, (G) via `ProviderRouter`, (K) optionally via
/// `RagComponents`. (E)'s identity resolution lives one layer up in the
/// gateway's extractor; (H)'s SSE plumbing lives one layer over in
/// `convoy_streaming` — this crate only drives them.
pub struct ChatService {
    repository: Repository,
    quota: Arc<QuotaEngine>,
    memory: Arc<MemoryEngine>,
    provider: Arc<ProviderRouter>,
    rag: Option<RagComponents>,
}

impl ChatService {
    pub fn new(
        repository: Repository,
        quota: Arc<QuotaEngine>,
        memory: Arc<MemoryEngine>,
        provider: Arc<ProviderRouter>,
        rag: Option<RagComponents>,
    ) -> Self {
        Self { repository, quota, memory, provider, rag }
    }

    /// §4.M steps 2-7, shared by every turn variant (unary/streaming,
    /// plain/RAG). Returns the resolved chat id and the composed provider
    /// messages; callers append whatever (K) contributes before calling
    /// into (G)/(H).
    async fn prepare_turn(&self, req: &ChatTurnRequest) -> Result<(ChatId, Vec<LlmMessage>)> {
        let decision = self.quota.check(req.org_id.as_str()).await;
        if !decision.allowed {
            return Err(ApiError::QuotaExhausted { reset_at: decision.reset_at });
        }

        let chat_id = self.resolve_chat(req)?;
        validate_message(&req.message)?;

        self.repository.with_conn(|conn| {
            convoy_repository::messages::append(conn, &chat_id, MessageRole::User, &req.message, None)
        })?;
        self.repository.with_conn(|conn| convoy_repository::chats::touch(conn, &chat_id))?;
        if let Err(e) = self.memory.invalidate_cache(&chat_id).await {
            warn!(chat_id = %chat_id.as_str(), error = %e, "failed to invalidate memory cache");
        }

        let window = {
            let conn_handle = self.repository.shared_connection();
            let conn = conn_handle.lock().unwrap();
            let window = self.memory.select_window(&conn, &chat_id)?;
            if self.memory.summarize_if_due(&conn, &chat_id, self.provider.as_ref()).await.is_some() {
                info!(chat_id = %chat_id.as_str(), "chat summarized");
            }
            window
        };

        let messages = self.memory.compose_messages(&window);
        Ok((chat_id, messages))
    }

    fn resolve_chat(&self, req: &ChatTurnRequest) -> Result<ChatId> {
        match &req.chat_id {
            Some(id) => {
                let chat = self
                    .repository
                    .with_conn(|conn| convoy_repository::chats::get(conn, &req.org_id, id))?;
                chat.map(|c| c.id).ok_or(ApiError::NotFound)
            }
            None => {
                let title = default_title(&req.message);
                let chat = self.repository.with_conn(|conn| {
                    convoy_repository::chats::create(conn, &req.org_id, &req.user_id, &title)
                })?;
                Ok(chat.id)
            }
        }
    }

    fn rag_retriever(&self, org_id: &str) -> Result<RagRetriever> {
        let rag = self
            .rag
            .as_ref()
            .ok_or_else(|| ApiError::Internal("RAG is not configured on this server".into()))?;
        Ok(RagRetriever::new(rag.embedder.clone(), rag.vector_index.clone(), org_id.to_string()))
    }

    /// §4.M step 8, unary branch.
    pub async fn handle_turn(&self, req: ChatTurnRequest) -> Result<ChatTurnOutcome> {
        let (chat_id, messages) = self.prepare_turn(&req).await?;
        let started = Instant::now();
        let (result, fallback_attempted) = self.provider.chat_with_fallback(&messages, CHAT_PROMPT_NAME).await;
        let outcome = result.map_err(|e| ApiError::Upstream { message: e.to_string(), fallback_attempted })?;
        self.record_prompt_usage(CHAT_PROMPT_NAME, outcome.usage.total(), started);

        let assistant = self.repository.with_conn(|conn| {
            convoy_repository::messages::append(
                conn,
                &chat_id,
                MessageRole::Assistant,
                &outcome.text,
                Some(outcome.usage.output_tokens),
            )
        })?;

        Ok(ChatTurnOutcome {
            chat_id,
            message_id: assistant.id,
            reply: outcome.text,
            created_at: Utc::now(),
            usage: outcome.usage,
        })
    }

    /// §4.M step 8, streaming branch. Persistence happens inside (H) after
    /// the stream completes, not here (§4.H, §4.M).
    pub async fn handle_turn_streaming(
        &self,
        req: ChatTurnRequest,
    ) -> Result<Sse<ReceiverStream<std::result::Result<Event, Infallible>>>> {
        let (chat_id, messages) = self.prepare_turn(&req).await?;
        Ok(self.drive_stream(chat_id, messages, req.correlation_id, None))
    }

    /// Same shape as `handle_turn`, with (K) inserted between (F) and (G)
    /// per §2's control-flow paragraph.
    pub async fn handle_rag_turn(&self, req: ChatTurnRequest) -> Result<RagChatTurnOutcome> {
        let retriever = self.rag_retriever(req.org_id.as_str())?;
        let (chat_id, conversation) = self.prepare_turn(&req).await?;

        let started = Instant::now();
        let answer =
            retrieve_and_answer(&retriever, self.provider.as_ref(), CHAT_PROMPT_NAME, &conversation, &req.message)
                .await?;
        self.record_prompt_usage(CHAT_PROMPT_NAME, answer.usage.total(), started);

        let assistant = self.repository.with_conn(|conn| {
            convoy_repository::messages::append(
                conn,
                &chat_id,
                MessageRole::Assistant,
                &answer.answer,
                Some(answer.usage.output_tokens),
            )
        })?;

        Ok(RagChatTurnOutcome {
            chat_id,
            message_id: assistant.id,
            reply: answer.answer,
            created_at: Utc::now(),
            usage: answer.usage,
            rag_context: convoy_rag::types::RagContext {
                documents_used: answer.documents.len(),
                sources: answer.sources,
            },
        })
    }

    /// RAG streaming branch: retrieval happens up front (§4.K "Streaming
    /// path mirrors the unary one"), then (H) drives the actual token
    /// emission with `rag_context` riding on the completion frame.
    pub async fn handle_rag_turn_streaming(
        &self,
        req: ChatTurnRequest,
    ) -> Result<Sse<ReceiverStream<std::result::Result<Event, Infallible>>>> {
        let retriever = self.rag_retriever(req.org_id.as_str())?;
        let (chat_id, conversation) = self.prepare_turn(&req).await?;

        let (messages, rag_context) = prepare_stream_turn(&retriever, &conversation, &req.message).await?;
        let rag_context_json = serde_json::json!({
            "documents_used": rag_context.documents_used,
            "sources": rag_context.sources,
        });

        Ok(self.drive_stream(chat_id, messages, req.correlation_id, Some(rag_context_json)))
    }

    fn drive_stream(
        &self,
        chat_id: ChatId,
        messages: Vec<LlmMessage>,
        correlation_id: String,
        rag_context: Option<serde_json::Value>,
    ) -> Sse<ReceiverStream<std::result::Result<Event, Infallible>>> {
        let ctx = StreamTurnContext {
            repository: self.repository.clone(),
            provider: self.provider.clone(),
            chat_id,
            prompt_name: CHAT_PROMPT_NAME.to_string(),
            correlation_id,
            rag_context,
        };
        stream_chat_turn(ctx, messages)
    }

    /// Best-effort (L) statistics update (§4.L "update_stats"). Never fails
    /// the turn — a missing prompt row or a write error is logged only,
    /// mirroring `MemoryEngine::summarize_if_due`'s absorb-and-continue
    /// pattern.
    fn record_prompt_usage(&self, prompt_name: &str, tokens: u32, started: Instant) {
        let result = self.repository.with_conn(|conn| {
            if let Some(prompt) = convoy_repository::prompts::get_active(conn, prompt_name)? {
                convoy_llm::prompts::PromptRegistry::record_invocation(conn, &prompt.id, tokens, started)
                    .map_err(|e| convoy_repository::error::RepositoryError::Conflict(e.to_string()))?;
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!(prompt_name, error = %e, "failed to record prompt invocation stats");
        }
    }
}

fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty".into()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::Validation(format!(
            "message exceeds the {MAX_MESSAGE_CHARS} character limit"
        )));
    }
    Ok(())
}

fn default_title(message: &str) -> String {
    let trimmed = message.trim();
    let truncated: String = trimmed.chars().take(DEFAULT_TITLE_CHARS).collect();
    if truncated.is_empty() {
        "New chat".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_core::ids::{OrgId, UserId};
    use convoy_core::role::Role;
    use convoy_kvstore::SqliteKvStore;
    use convoy_llm::error::Result as LlmResult;
    use convoy_llm::stream::StreamOptions;
    use convoy_llm::types::{ChatOutcome, Usage};
    use convoy_llm::ProviderSlot;
    use convoy_quota::QuotaEngine;
    use rusqlite::Connection;

    struct FakeProvider {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn chat(&self, _messages: &[LlmMessage], _prompt_name: &str) -> LlmResult<ChatOutcome> {
            Ok(ChatOutcome {
                text: self.reply.to_string(),
                usage: Usage { input_tokens: 5, output_tokens: 3 },
                provider_name: "fake".into(),
            })
        }

        async fn stream_chat(&self, _messages: &[LlmMessage], _opts: StreamOptions) -> LlmResult<()> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn test_service() -> (ChatService, OrgId, UserId) {
        let repo = Repository::new(Connection::open_in_memory().unwrap()).unwrap();
        let org = repo.with_conn(|c| convoy_repository::organizations::create(c, "Acme", "acme")).unwrap();
        let user = repo
            .with_conn(|c| convoy_repository::users::create(c, &org.id, "a@acme.com", "A", Role::Owner))
            .unwrap();

        let kv_conn = Connection::open_in_memory().unwrap();
        let kv = Arc::new(SqliteKvStore::new(kv_conn).unwrap());
        let quota = Arc::new(QuotaEngine::new(kv.clone(), 20.0, 1.0, 60));
        let memory = Arc::new(MemoryEngine::new(kv, 8_000, 50, 6_000, 20));
        let provider = Arc::new(ProviderRouter::new(vec![ProviderSlot::new(
            Box::new(FakeProvider { reply: "Hello there" }),
            0,
        )]));

        (ChatService::new(repo, quota, memory, provider, None), org.id, user.id)
    }

    #[tokio::test]
    async fn happy_path_creates_chat_and_persists_both_turns() {
        let (service, org_id, user_id) = test_service();
        let req = ChatTurnRequest {
            org_id: org_id.clone(),
            user_id: user_id.clone(),
            chat_id: None,
            message: "Say hello".to_string(),
            correlation_id: "corr-1".to_string(),
        };

        let outcome = service.handle_turn(req).await.unwrap();
        assert_eq!(outcome.reply, "Hello there");
        assert!(outcome.usage.total() >= 1);

        let chats =
            service.repository.with_conn(|c| convoy_repository::chats::list_for_user(c, &org_id, &user_id)).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, outcome.chat_id);

        let messages =
            service.repository.with_conn(|c| convoy_repository::messages::list_for_chat(c, &outcome.chat_id)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn foreign_chat_id_is_not_found() {
        let (service, org_id, user_id) = test_service();
        let foreign = convoy_core::ids::ChatId::new();
        let req = ChatTurnRequest {
            org_id,
            user_id,
            chat_id: Some(foreign),
            message: "hi".to_string(),
            correlation_id: "corr-2".to_string(),
        };

        let err = service.handle_turn(req).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let (service, org_id, user_id) = test_service();
        let req = ChatTurnRequest {
            org_id,
            user_id,
            chat_id: None,
            message: "   ".to_string(),
            correlation_id: "corr-3".to_string(),
        };

        let err = service.handle_turn(req).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let (service, org_id, user_id) = test_service();
        let req = ChatTurnRequest {
            org_id,
            user_id,
            chat_id: None,
            message: "a".repeat(MAX_MESSAGE_CHARS + 1),
            correlation_id: "corr-4".to_string(),
        };

        let err = service.handle_turn(req).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn rag_turn_without_configured_rag_is_internal_error() {
        let (service, org_id, user_id) = test_service();
        let req = ChatTurnRequest {
            org_id,
            user_id,
            chat_id: None,
            message: "what do transformers use?".to_string(),
            correlation_id: "corr-5".to_string(),
        };

        let err = service.handle_rag_turn(req).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
