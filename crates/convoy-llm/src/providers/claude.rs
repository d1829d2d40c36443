use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ProviderError, Result};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent, StreamOptions};
use crate::types::{ChatOutcome, Message, Role, Usage};
use crate::LlmProvider;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API provider. SSE parsing is grounded in the
/// teacher's `skynet_agent::anthropic_stream` module; reuses this crate's
/// shared `parse_sse_line` rather than duplicating the line-splitting
/// logic per provider.
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }

    fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: UsageBlock,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamFrame {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaText },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: MessageDeltaInner,
        usage: PartialUsage,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaText {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInner {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PartialUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn chat(&self, messages: &[Message], _prompt_name: &str) -> Result<ChatOutcome> {
        let body = json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": Self::to_wire_messages(messages),
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let text = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");
        let blocked = parsed.stop_reason.as_deref() == Some("refusal");

        Ok(ChatOutcome {
            text: if blocked { crate::types::BLOCKED_MARKER.to_string() } else { text },
            usage: Usage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
            provider_name: self.name().to_string(),
        })
    }

    async fn stream_chat(&self, messages: &[Message], opts: StreamOptions) -> Result<()> {
        let body = json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": Self::to_wire_messages(messages),
            "stream": true,
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let mut byte_stream = resp.bytes_stream();
        let mut leftover = String::new();
        let mut tokens_out = 0u32;
        let tokens_in_estimate: u32 = messages
            .iter()
            .map(|m| crate::estimate_tokens_heuristic(&m.content))
            .sum();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            leftover.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(idx) = leftover.find('\n') {
                let line = leftover[..idx].to_string();
                leftover.drain(..=idx);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match parse_sse_line(line) {
                    Some(SseParsed::Data(data)) => {
                        let frame: StreamFrame = match serde_json::from_str(&data) {
                            Ok(f) => f,
                            Err(_) => continue,
                        };
                        match frame {
                            StreamFrame::ContentBlockDelta { delta } => {
                                if !delta.text.is_empty()
                                    && opts
                                        .tx
                                        .send(StreamEvent::TextDelta { text: delta.text })
                                        .await
                                        .is_err()
                                {
                                    return Ok(());
                                }
                            }
                            StreamFrame::MessageDelta { delta, usage } => {
                                tokens_out = usage.output_tokens;
                                if delta.stop_reason.as_deref() == Some("refusal") {
                                    let _ = opts.tx.send(StreamEvent::Blocked).await;
                                }
                            }
                            StreamFrame::MessageStop => {
                                let _ = opts
                                    .tx
                                    .send(StreamEvent::Done {
                                        tokens_in: tokens_in_estimate,
                                        tokens_out,
                                        stop_reason: "stop".into(),
                                    })
                                    .await;
                                return Ok(());
                            }
                            StreamFrame::Other => {}
                        }
                    }
                    Some(SseParsed::Event(_)) | None => {}
                }
            }
        }

        Ok(())
    }
}
