use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::stream::{StreamEvent, StreamOptions};
use crate::types::{ChatOutcome, Message, Role, Usage};
use crate::{EmbeddingProvider, LlmProvider};

/// Talks to an on-host inference server speaking the Ollama-style
/// `/api/chat` and `/api/embeddings` HTTP surface. Grounded in the
/// teacher's `skynet_agent::ollama::OllamaProvider` — same request shape,
/// same non-streaming/streaming split, generalized to this workspace's
/// `Message`/`StreamEvent` types.
pub struct LocalProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn chat_messages(&self, messages: &[Message], prompt_name: &str) -> Vec<OllamaMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(OllamaMessage {
            role: "system".to_string(),
            content: format!("[{prompt_name}] {}", crate::FALLBACK_SYSTEM_PROMPT),
        });
        out.extend(messages.iter().map(|m| OllamaMessage {
            role: match m.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        }));
        out
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn chat(&self, messages: &[Message], prompt_name: &str) -> Result<ChatOutcome> {
        let body = json!({
            "model": self.model,
            "messages": self.chat_messages(messages, prompt_name),
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let parsed: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if !parsed.done {
            warn!("local provider returned a non-terminal chat response");
        }

        Ok(ChatOutcome {
            text: parsed.message.content,
            usage: Usage {
                input_tokens: parsed.prompt_eval_count,
                output_tokens: parsed.eval_count,
            },
            provider_name: self.name().to_string(),
        })
    }

    async fn stream_chat(&self, messages: &[Message], opts: StreamOptions) -> Result<()> {
        let body = json!({
            "model": self.model,
            "messages": self.chat_messages(messages, &opts.prompt_name),
            "stream": true,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;

        let mut tokens_in = 0u32;
        let mut tokens_out = 0u32;
        let mut buf = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parsed: OllamaChatResponse = match serde_json::from_str(line) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "skipping unparsable local provider chunk");
                        continue;
                    }
                };
                if !parsed.message.content.is_empty() {
                    if opts
                        .tx
                        .send(StreamEvent::TextDelta { text: parsed.message.content })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
                if parsed.prompt_eval_count > 0 {
                    tokens_in = parsed.prompt_eval_count;
                }
                if parsed.eval_count > 0 {
                    tokens_out = parsed.eval_count;
                }
                if parsed.done {
                    let _ = opts
                        .tx
                        .send(StreamEvent::Done { tokens_in, tokens_out, stop_reason: "stop".into() })
                        .await;
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "prompt": text });

        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let parsed: OllamaEmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if parsed.embedding.len() != crate::EMBEDDING_DIMENSIONS {
            return Err(ProviderError::Parse(format!(
                "expected {}-dimension embedding, got {}",
                crate::EMBEDDING_DIMENSIONS,
                parsed.embedding.len()
            )));
        }

        Ok(parsed.embedding)
    }
}
