use serde::Serialize;

use convoy_llm::types::Usage;

/// One retrieved chunk, surfaced verbatim in the unary response shape
/// (§4.K step 5, §6 scenario 6).
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub filename: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub documents: Vec<RetrievedDocument>,
    pub sources: Vec<String>,
    pub usage: Usage,
}

/// Carried on the streaming completion frame as `rag_context` (§4.H, §4.K).
#[derive(Debug, Clone, Serialize)]
pub struct RagContext {
    pub documents_used: usize,
    pub sources: Vec<String>,
}
