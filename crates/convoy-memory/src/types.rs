use convoy_repository::types::{Message, Summary};

/// Result of `MemoryEngine::select_window` (§4.F steps 1-4).
#[derive(Debug, Clone)]
pub struct WindowSelection {
    pub selected: Vec<Message>,
    pub summary: Option<Summary>,
    pub total_tokens: u64,
    /// True when at least one older message was left out of `selected`.
    pub truncated: bool,
}
