use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::warn;

use convoy_kvstore::KvStore;
use convoy_llm::types::{Message as LlmMessage, Role as LlmRole};
use convoy_llm::{estimate_tokens_heuristic, LlmProvider};
use convoy_repository::types::{Message, MessageRole, Summary};
use convoy_core::ids::ChatId;

use crate::error::Result;
use crate::triggers;
use crate::types::WindowSelection;

const SUMMARIZATION_PROMPT_NAME: &str = "summarization";
const RECENT_CACHE_TTL_SECS: u64 = 3_600;

fn cache_key(chat_id: &ChatId) -> String {
    format!("chat:{}:recent", chat_id.as_str())
}

/// Assembles a bounded-token prompt context per chat and drives
/// re-summarization (§4.F). Directly grounded in
/// `skynet-memory::manager::MemoryManager`'s cache-then-invalidate shape
/// and `skynet-agent::pipeline::compact`'s summarize-on-threshold flow.
pub struct MemoryEngine {
    kv: Arc<dyn KvStore>,
    max_context_tokens: u32,
    message_count_threshold: u32,
    token_threshold: u32,
    resummarize_delta: u32,
}

impl MemoryEngine {
    pub fn new(
        kv: Arc<dyn KvStore>,
        max_context_tokens: u32,
        message_count_threshold: u32,
        token_threshold: u32,
        resummarize_delta: u32,
    ) -> Self {
        Self {
            kv,
            max_context_tokens,
            message_count_threshold,
            token_threshold,
            resummarize_delta,
        }
    }

    /// §4.F window-selection algorithm, steps 1-4.
    pub fn select_window(&self, conn: &Connection, chat_id: &ChatId) -> Result<WindowSelection> {
        let summary = convoy_repository::summaries::latest_for_chat(conn, chat_id)?;
        let all_messages = convoy_repository::messages::list_for_chat(conn, chat_id)?;

        let budget = self
            .max_context_tokens
            .saturating_sub(summary.as_ref().map(|s| s.summary_tokens).unwrap_or(0))
            as u64;

        let mut selected: Vec<Message> = Vec::new();
        let mut total_tokens: u64 = 0;
        let mut truncated = false;

        for (idx, msg) in all_messages.iter().enumerate().rev() {
            let tokens = message_tokens(msg);
            let is_newest = idx == all_messages.len() - 1;
            if selected.is_empty() && is_newest {
                selected.push(msg.clone());
                total_tokens += tokens;
                continue;
            }
            if total_tokens + tokens > budget {
                truncated = true;
                break;
            }
            selected.push(msg.clone());
            total_tokens += tokens;
        }
        selected.reverse();

        Ok(WindowSelection {
            selected,
            summary,
            total_tokens,
            truncated,
        })
    }

    /// Whether a re-summarization pass is due right now for this chat.
    pub fn is_summarization_due(&self, conn: &Connection, chat_id: &ChatId) -> Result<bool> {
        let total_messages = convoy_repository::messages::count_for_chat(conn, chat_id)?;
        let latest_summary = convoy_repository::summaries::latest_for_chat(conn, chat_id)?;

        let (total_tokens, messages_since_summary) = match &latest_summary {
            Some(s) => {
                let tail = convoy_repository::messages::list_after(conn, chat_id, &s.end_message_id)?;
                let tail_tokens: u64 = tail.iter().map(message_tokens).sum();
                (s.original_tokens as u64 + tail_tokens, tail.len() as u32)
            }
            None => {
                let all = convoy_repository::messages::list_for_chat(conn, chat_id)?;
                let total: u64 = all.iter().map(message_tokens).sum();
                (total, all.len() as u32)
            }
        };

        Ok(triggers::should_summarize(
            total_messages,
            total_tokens,
            messages_since_summary,
            latest_summary.as_ref(),
            Utc::now(),
            self.message_count_threshold,
            self.token_threshold as u64,
            self.resummarize_delta,
        ))
    }

    /// Summarizes every message since the latest summary (or the whole
    /// history if none exists) via the `summarization` prompt name (§4.F,
    /// §9 "distinct prompt name" guard against re-entrancy).
    pub async fn summarize(
        &self,
        conn: &Connection,
        chat_id: &ChatId,
        provider: &dyn LlmProvider,
    ) -> Result<Summary> {
        let latest = convoy_repository::summaries::latest_for_chat(conn, chat_id)?;
        let to_summarize = match &latest {
            Some(s) => convoy_repository::messages::list_after(conn, chat_id, &s.end_message_id)?,
            None => convoy_repository::messages::list_for_chat(conn, chat_id)?,
        };

        if to_summarize.is_empty() {
            return Err(crate::error::MemoryError::Repository(
                convoy_repository::error::RepositoryError::Conflict("nothing to summarize".into()),
            ));
        }

        let original_tokens: u32 = to_summarize.iter().map(message_tokens).sum::<u64>() as u32;

        let mut rendered = String::new();
        for m in &to_summarize {
            rendered.push_str(&format!("{}: {}\n", m.role, m.content));
        }
        let llm_messages = vec![LlmMessage { role: LlmRole::User, content: rendered }];

        let outcome = provider.chat(&llm_messages, SUMMARIZATION_PROMPT_NAME).await?;
        let summary_tokens = provider.estimate_tokens(&outcome.text).max(1);

        let start_id = to_summarize.first().unwrap().id.clone();
        let end_id = to_summarize.last().unwrap().id.clone();

        let summary = convoy_repository::summaries::create(
            conn,
            chat_id,
            &outcome.text,
            &start_id,
            &end_id,
            to_summarize.len() as u32,
            original_tokens,
            summary_tokens,
        )?;

        Ok(summary)
    }

    /// Safe wrapper around `summarize`: on failure, logs a warning and
    /// returns `None` so the caller falls back to the sliding window only
    /// (§4.F, §7 "Summarization failure... absorbed").
    pub async fn summarize_if_due(
        &self,
        conn: &Connection,
        chat_id: &ChatId,
        provider: &dyn LlmProvider,
    ) -> Option<Summary> {
        match self.is_summarization_due(conn, chat_id) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "failed to evaluate summarization trigger");
                return None;
            }
        }

        match self.summarize(conn, chat_id, provider).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "summarization failed, continuing with sliding window");
                None
            }
        }
    }

    /// Synthetic leading turn pair plus the selected window (§4.F final
    /// paragraph).
    pub fn compose_messages(&self, window: &WindowSelection) -> Vec<LlmMessage> {
        let mut out = Vec::with_capacity(window.selected.len() + 2);

        if let Some(summary) = &window.summary {
            out.push(LlmMessage {
                role: LlmRole::User,
                content: format!("[Previous conversation summary: {}]", summary.summary_text),
            });
            out.push(LlmMessage {
                role: LlmRole::Assistant,
                content: "Understood, I'll keep that context in mind.".to_string(),
            });
        }

        for msg in &window.selected {
            let role = match msg.role {
                MessageRole::User => LlmRole::User,
                MessageRole::Assistant => LlmRole::Assistant,
                // A system-role row (if ever persisted) rides along as a
                // user turn; the active system prompt is injected by (G).
                MessageRole::System => LlmRole::User,
            };
            out.push(LlmMessage { role, content: msg.content.clone() });
        }

        out
    }

    /// Cached rendered window for a chat, if present and unexpired.
    pub async fn cached_window(&self, chat_id: &ChatId) -> Result<Option<String>> {
        Ok(self.kv.get(&cache_key(chat_id)).await?)
    }

    pub async fn cache_window(&self, chat_id: &ChatId, rendered: &str) -> Result<()> {
        self.kv.set(&cache_key(chat_id), rendered, RECENT_CACHE_TTL_SECS).await?;
        Ok(())
    }

    /// Invalidates the cached window. Callers invoke this on every new
    /// message append (§4.F "Cache").
    pub async fn invalidate_cache(&self, chat_id: &ChatId) -> Result<()> {
        self.kv.delete(&cache_key(chat_id)).await?;
        Ok(())
    }
}

fn message_tokens(msg: &Message) -> u64 {
    msg.token_count
        .map(|t| t as u64)
        .unwrap_or_else(|| estimate_tokens_heuristic(&msg.content) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_kvstore::SqliteKvStore;
    use convoy_llm::error::Result as LlmResult;
    use convoy_llm::stream::StreamOptions;
    use convoy_llm::types::{ChatOutcome, Usage};
    use convoy_repository::db;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        conn
    }

    fn engine() -> MemoryEngine {
        let kv_conn = Connection::open_in_memory().unwrap();
        let kv = Arc::new(SqliteKvStore::new(kv_conn).unwrap());
        MemoryEngine::new(kv, 8_000, 50, 6_000, 20)
    }

    struct FakeProvider;
    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        async fn chat(&self, _messages: &[LlmMessage], _prompt_name: &str) -> LlmResult<ChatOutcome> {
            Ok(ChatOutcome {
                text: "summary text".into(),
                usage: Usage { input_tokens: 10, output_tokens: 5 },
                provider_name: "fake".into(),
            })
        }
        async fn stream_chat(&self, _messages: &[LlmMessage], _opts: StreamOptions) -> LlmResult<()> {
            unimplemented!()
        }
    }

    fn make_chat(conn: &Connection) -> ChatId {
        let org = convoy_repository::organizations::create(conn, "Acme", "acme").unwrap();
        let user = convoy_repository::users::create(
            conn,
            &org.id,
            "a@a.com",
            "A",
            convoy_core::role::Role::Owner,
        )
        .unwrap();
        let chat = convoy_repository::chats::create(conn, &org.id, &user.id, "hi").unwrap();
        chat.id
    }

    #[test]
    fn select_window_always_includes_newest_even_if_over_budget() {
        let conn = setup();
        let chat_id = make_chat(&conn);
        let huge = "x".repeat(40_000);
        convoy_repository::messages::append(&conn, &chat_id, MessageRole::User, &huge, None).unwrap();

        let eng = engine();
        let window = eng.select_window(&conn, &chat_id).unwrap();
        assert_eq!(window.selected.len(), 1);
        assert_eq!(window.selected[0].content, huge);
    }

    #[test]
    fn select_window_stops_once_budget_exhausted() {
        let conn = setup();
        let chat_id = make_chat(&conn);
        for i in 0..5 {
            convoy_repository::messages::append(
                &conn,
                &chat_id,
                MessageRole::User,
                &format!("message {i}"),
                Some(3000),
            )
            .unwrap();
        }
        let eng = MemoryEngine::new(
            Arc::new(SqliteKvStore::new(Connection::open_in_memory().unwrap()).unwrap()),
            8_000,
            50,
            6_000,
            20,
        );
        let window = eng.select_window(&conn, &chat_id).unwrap();
        assert!(window.selected.len() < 5);
        assert!(window.truncated);
    }

    #[tokio::test]
    async fn summarize_persists_and_computes_compression_ratio() {
        let conn = setup();
        let chat_id = make_chat(&conn);
        for i in 0..3 {
            convoy_repository::messages::append(
                &conn,
                &chat_id,
                MessageRole::User,
                &format!("turn {i}"),
                Some(10),
            )
            .unwrap();
        }
        let eng = engine();
        let summary = eng.summarize(&conn, &chat_id, &FakeProvider).await.unwrap();
        assert_eq!(summary.covered_message_count, 3);
        assert!(summary.compression_ratio > 0.0);
    }

    #[test]
    fn compose_messages_prepends_synthetic_summary_turn_pair() {
        let summary = Summary {
            id: "s1".into(),
            chat_id: "c1".into(),
            summary_text: "the user asked about pricing".into(),
            start_message_id: "m1".into(),
            end_message_id: "m2".into(),
            covered_message_count: 10,
            original_tokens: 500,
            summary_tokens: 60,
            compression_ratio: 8.3,
            created_at: Utc::now().to_rfc3339(),
        };
        let window = WindowSelection {
            selected: vec![],
            summary: Some(summary),
            total_tokens: 0,
            truncated: false,
        };
        let eng = engine();
        let composed = eng.compose_messages(&window);
        assert_eq!(composed.len(), 2);
        assert_eq!(composed[0].role, LlmRole::User);
        assert!(composed[0].content.contains("pricing"));
        assert_eq!(composed[1].role, LlmRole::Assistant);
    }

    #[tokio::test]
    async fn cache_roundtrip_and_invalidate() {
        let eng = engine();
        let chat_id = ChatId::new();
        assert!(eng.cached_window(&chat_id).await.unwrap().is_none());
        eng.cache_window(&chat_id, "rendered-window").await.unwrap();
        assert_eq!(eng.cached_window(&chat_id).await.unwrap().unwrap(), "rendered-window");
        eng.invalidate_cache(&chat_id).await.unwrap();
        assert!(eng.cached_window(&chat_id).await.unwrap().is_none());
    }
}
