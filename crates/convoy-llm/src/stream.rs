use tokio::sync::mpsc;

/// Events emitted during a streaming chat call. A trimmed version of the
/// teacher's `skynet_agent::stream::StreamEvent` — no `Thinking`/`ToolUse`
/// variants, since spec.md has no tool-calling or extended-reasoning
/// concept.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta { text: String },
    /// A chunk was withheld by the provider's safety policy. No token is
    /// emitted for it, but usage metadata continues to accumulate from
    /// later chunks (§4.G "Safety handling").
    Blocked,
    Done {
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },
    Error {
        message: String,
    },
}

/// Options passed to `stream_chat`. `on_token`/`on_complete`/`on_error` in
/// spec.md's interface description become a single `mpsc::Sender<StreamEvent>`
/// — the teacher's `send_stream` signature already uses channels rather than
/// raw callbacks, so this workspace keeps that idiom verbatim.
pub struct StreamOptions {
    pub correlation_id: String,
    pub prompt_name: String,
    pub tx: mpsc::Sender<StreamEvent>,
}

/// Parses a single SSE line emitted by Anthropic/Gemini-style streaming
/// APIs. SSE format: `event: <type>` / `data: <json>`.
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}
