use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ProviderError, Result};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent, StreamOptions};
use crate::types::{ChatOutcome, Message, Role, Usage};
use crate::LlmProvider;

/// Google Generative Language API provider (`generateContent` /
/// `streamGenerateContent`). Reuses the same SSE line parser as
/// `ClaudeProvider` since both wire formats are `data: <json>` frames,
/// matching the teacher's habit of sharing one SSE reader across
/// multiple provider modules.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    fn to_wire_contents(messages: &[Message]) -> Vec<WireContent> {
        messages
            .iter()
            .map(|m| WireContent {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "model".to_string(),
                },
                parts: vec![WirePart { text: m.content.clone() }],
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
struct WirePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    #[serde(default)]
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
    #[serde(default)]
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<WirePartOut>,
}

#[derive(Debug, Deserialize)]
struct WirePartOut {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct UsageMetadata {
    #[serde(default)]
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: u32,
    #[serde(default)]
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: u32,
}

fn finish_reason_is_safety(reason: &str) -> bool {
    reason == "SAFETY" || reason == "BLOCKLIST" || reason == "PROHIBITED_CONTENT"
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, messages: &[Message], _prompt_name: &str) -> Result<ChatOutcome> {
        let body = json!({ "contents": Self::to_wire_contents(messages) });

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("no candidates in response".into()))?;

        let blocked = candidate
            .finish_reason
            .as_deref()
            .map(finish_reason_is_safety)
            .unwrap_or(false);

        let text = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(ChatOutcome {
            text: if blocked { crate::types::BLOCKED_MARKER.to_string() } else { text },
            usage: Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
            provider_name: self.name().to_string(),
        })
    }

    async fn stream_chat(&self, messages: &[Message], opts: StreamOptions) -> Result<()> {
        let body = json!({ "contents": Self::to_wire_contents(messages) });

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                self.base_url, self.model, self.api_key
            ))
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
        let mut tokens_in = 0u32;
        let mut tokens_out = 0u32;

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

                if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                    let parsed: GenerateContentResponse = match serde_json::from_str(&data) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    if let Some(usage) = parsed.usage_metadata {
                        tokens_in = usage.prompt_token_count;
                        tokens_out = usage.candidates_token_count;
                    }
                    if let Some(candidate) = parsed.candidates.into_iter().next() {
                        let blocked = candidate
                            .finish_reason
                            .as_deref()
                            .map(finish_reason_is_safety)
                            .unwrap_or(false);
                        if blocked {
                            let _ = opts.tx.send(StreamEvent::Blocked).await;
                        } else {
                            for part in candidate.content.parts {
                                if part.text.is_empty() {
                                    continue;
                                }
                                if opts
                                    .tx
                                    .send(StreamEvent::TextDelta { text: part.text })
                                    .await
                                    .is_err()
                                {
                                    return Ok(());
                                }
                            }
                        }
                        if candidate.finish_reason.is_some() {
                            let _ = opts
                                .tx
                                .send(StreamEvent::Done { tokens_in, tokens_out, stop_reason: "stop".into() })
                                .await;
                            return Ok(());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
