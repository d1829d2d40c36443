pub mod error;
pub mod health;
pub mod prompts;
pub mod providers;
pub mod router;
pub mod stream;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::stream::StreamOptions;
use crate::types::{ChatOutcome, Message};

pub use router::{ProviderRouter, ProviderSlot};

/// Built-in fallback system prompt used when no active prompt row exists
/// for the requested name (§4.G). Logged every time it is used — cheap
/// enough at this call rate not to need a once-only guard, matching the
/// teacher's non-hot-path warning style.
pub const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the user's questions clearly and concisely.";

/// Uniform interface every provider implements (§4.G). `estimate_tokens`/
/// `would_exceed_budget` have default implementations so concrete
/// providers only need to supply them if their API exposes a cheaper or
/// more accurate estimate.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, messages: &[Message], prompt_name: &str) -> Result<ChatOutcome>;

    async fn stream_chat(&self, messages: &[Message], opts: StreamOptions) -> Result<()>;

    /// Cheap heuristic: `⌈len/4⌉`, the same approximation used across this
    /// workspace wherever a native token count isn't available.
    fn estimate_tokens(&self, text: &str) -> u32 {
        estimate_tokens_heuristic(text)
    }

    fn would_exceed_budget(&self, messages: &[Message], budget: u32) -> bool {
        let total: u32 = messages
            .iter()
            .map(|m| self.estimate_tokens(&m.content))
            .sum();
        total > budget
    }
}

/// `⌈len/4⌉` token estimate heuristic (§4.G), factored out so every
/// provider and the memory engine's window selector share one definition.
pub fn estimate_tokens_heuristic(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

/// Embedding capability carried only by the local provider (§4.G, §9
/// "an embedding capability on the local provider").
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns a 768-dimension cosine-similarity vector (§4.G, §4.J).
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub const EMBEDDING_DIMENSIONS: usize = 768;
