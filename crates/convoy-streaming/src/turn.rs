use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use convoy_core::ids::ChatId;
use convoy_llm::stream::{StreamEvent, StreamOptions};
use convoy_llm::types::Message as LlmMessage;
use convoy_llm::LlmProvider;
use convoy_repository::types::MessageRole;
use convoy_repository::Repository;

use crate::types::{Frame, FrameUsage};

/// Everything `stream_chat_turn` needs that outlives the request. Grounded
/// in `skynet-gateway::http::openai_compat::handle_streaming`, but the
/// work that must survive a client disconnect (buffer accumulation,
/// post-stream persistence) runs inside the detached `tokio::spawn`ed
/// task, not the `Stream` axum polls — that stream gets dropped the
/// moment the client closes the connection, and code placed after a
/// cancelled await point in a generator never runs. The teacher's
/// raw-pointer `unsafe` trick for sharing `AppState` into the spawned
/// task is replaced here by `Clone`/`Arc` handles; `StreamTurnContext`
/// is `'static` on its own.
#[derive(Clone)]
pub struct StreamTurnContext {
    pub repository: Repository,
    pub provider: Arc<dyn LlmProvider>,
    pub chat_id: ChatId,
    pub prompt_name: String,
    pub correlation_id: String,
    pub rag_context: Option<serde_json::Value>,
}

/// Drives one streaming chat turn end to end (§4.H).
pub fn stream_chat_turn(
    ctx: StreamTurnContext,
    messages: Vec<LlmMessage>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let (out_tx, out_rx) = mpsc::channel::<Result<Event, Infallible>>(64);
    let (provider_tx, mut provider_rx) = mpsc::channel::<StreamEvent>(64);

    let provider = ctx.provider.clone();
    let opts = StreamOptions {
        correlation_id: ctx.correlation_id.clone(),
        prompt_name: ctx.prompt_name.clone(),
        tx: provider_tx,
    };

    tokio::spawn(async move {
        let provider_handle = tokio::spawn(async move {
            if let Err(e) = provider.stream_chat(&messages, opts).await {
                warn!(error = %e, "stream_chat failed before completion");
            }
        });

        let mut buffer = String::new();
        let mut disconnected = false;

        while let Some(event) = provider_rx.recv().await {
            if disconnected {
                // Further emissions from the provider are accepted and
                // dropped once the client has gone away (§4.H).
                continue;
            }
            match event {
                StreamEvent::TextDelta { text } => {
                    buffer.push_str(&text);
                    let frame = Frame::token(text);
                    let event = Ok(Event::default().data(serde_json::to_string(&frame).unwrap_or_default()));
                    if out_tx.send(event).await.is_err() {
                        disconnected = true;
                        warn!(
                            correlation_id = %ctx.correlation_id,
                            "client disconnected mid-stream"
                        );
                    }
                }
                StreamEvent::Blocked => {}
                StreamEvent::Done { tokens_in, tokens_out, .. } => {
                    let usage = FrameUsage { input_tokens: tokens_in, output_tokens: tokens_out };
                    let frame = Frame::completion(buffer.clone(), Some(usage), ctx.rag_context.clone());
                    let event = Ok(Event::default().data(serde_json::to_string(&frame).unwrap_or_default()));
                    let _ = out_tx.send(event).await;
                    break;
                }
                StreamEvent::Error { message } => {
                    let frame = Frame::error(message);
                    let event = Ok(Event::default().data(serde_json::to_string(&frame).unwrap_or_default()));
                    let _ = out_tx.send(event).await;
                    break;
                }
            }
        }

        let _ = provider_handle.await;
        persist_assistant_turn(&ctx, &buffer);
    });

    Sse::new(ReceiverStream::new(out_rx)).keep_alive(KeepAlive::default())
}

/// Persists the assistant turn with whatever text was accumulated before
/// the stream ended — completion, error, or disconnect (§4.H "Post-stream
/// persistence", §9 "Partial stream persistence is best-effort").
fn persist_assistant_turn(ctx: &StreamTurnContext, buffer: &str) {
    if buffer.is_empty() {
        return;
    }
    let result = ctx.repository.with_conn(|conn| {
        convoy_repository::messages::append(conn, &ctx.chat_id, MessageRole::Assistant, buffer, None)
    });
    if let Err(e) = result {
        warn!(
            correlation_id = %ctx.correlation_id,
            error = %e,
            "failed to persist assistant turn after stream"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_llm::error::Result as LlmResult;
    use convoy_repository::db;
    use futures_util::StreamExt;
    use rand::Rng;
    use rusqlite::Connection;

    /// Splits a fixed string on whitespace and emits one `TextDelta` per
    /// word with a randomized 10-30ms delay, then `Done` (§4.H, test-only).
    pub struct SimulatedProvider {
        pub text: String,
    }

    #[async_trait]
    impl LlmProvider for SimulatedProvider {
        fn name(&self) -> &str {
            "simulated"
        }

        async fn chat(
            &self,
            _messages: &[LlmMessage],
            _prompt_name: &str,
        ) -> LlmResult<convoy_llm::types::ChatOutcome> {
            unimplemented!("simulated provider is stream-only")
        }

        async fn stream_chat(&self, _messages: &[LlmMessage], opts: StreamOptions) -> LlmResult<()> {
            let mut tokens_out = 0u32;
            for word in self.text.split_whitespace() {
                let delay_ms = rand::thread_rng().gen_range(10..=30);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                tokens_out += 1;
                if opts.tx.send(StreamEvent::TextDelta { text: format!("{word} ") }).await.is_err() {
                    return Ok(());
                }
            }
            let _ = opts
                .tx
                .send(StreamEvent::Done { tokens_in: 5, tokens_out, stop_reason: "stop".into() })
                .await;
            Ok(())
        }
    }

    fn setup_repo() -> Repository {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        Repository::new(conn).unwrap()
    }

    fn make_chat(repo: &Repository) -> ChatId {
        repo.with_conn(|conn| {
            let org = convoy_repository::organizations::create(conn, "Acme", "acme")?;
            let user = convoy_repository::users::create(
                conn,
                &org.id,
                "a@a.com",
                "A",
                convoy_core::role::Role::Owner,
            )?;
            let chat = convoy_repository::chats::create(conn, &org.id, &user.id, "hi")?;
            Ok(chat.id)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn full_stream_emits_tokens_then_completion_and_persists() {
        let repo = setup_repo();
        let chat_id = make_chat(&repo);
        let ctx = StreamTurnContext {
            repository: repo.clone(),
            provider: Arc::new(SimulatedProvider { text: "hello there friend".into() }),
            chat_id: chat_id.clone(),
            prompt_name: "chat".into(),
            correlation_id: "corr-1".into(),
            rag_context: None,
        };

        let sse = stream_chat_turn(ctx, vec![]);
        let mut stream = axum::response::IntoResponse::into_response(sse)
            .into_body()
            .into_data_stream();
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.unwrap();
            let text = String::from_utf8_lossy(&bytes);
            if text.contains("\"done\":true") {
                saw_done = true;
                break;
            }
        }
        assert!(saw_done);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let messages = repo
            .with_conn(|conn| convoy_repository::messages::list_for_chat(conn, &chat_id))
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.contains("hello"));
    }

    #[tokio::test]
    async fn disconnect_persists_partial_buffer() {
        let repo = setup_repo();
        let chat_id = make_chat(&repo);
        let ctx = StreamTurnContext {
            repository: repo.clone(),
            provider: Arc::new(SimulatedProvider { text: "one two three four five".into() }),
            chat_id: chat_id.clone(),
            prompt_name: "chat".into(),
            correlation_id: "corr-2".into(),
            rag_context: None,
        };

        let sse = stream_chat_turn(ctx, vec![]);
        let mut stream = axum::response::IntoResponse::into_response(sse)
            .into_body()
            .into_data_stream();
        // Read exactly one frame then drop the stream, simulating a client
        // closing the connection after the first token (§8 scenario 5).
        let _first = stream.next().await;
        drop(stream);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let messages = repo
            .with_conn(|conn| convoy_repository::messages::list_for_chat(conn, &chat_id))
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].content.is_empty());
        assert!(messages[0].content.len() < "one two three four five ".len());
    }
}
