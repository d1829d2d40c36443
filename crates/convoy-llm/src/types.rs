use serde::{Deserialize, Serialize};

/// A message in the ordered sequence handed to a provider (§4.G): the
/// provider set only ever sees user/assistant turns — the active system
/// prompt is prepended separately by the provider itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Token usage reported by a provider, native when available, else derived
/// from the `⌈len/4⌉` estimate heuristic (§4.G "Usage accounting").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Result of a unary `chat` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: Usage,
    pub provider_name: String,
}

/// Marker substituted for a fully-blocked unary response (§4.G "Safety
/// handling").
pub const BLOCKED_MARKER: &str = "[response blocked by provider safety policy]";
