use std::sync::Arc;

use convoy_llm::types::{ChatOutcome, Message as LlmMessage};
use convoy_llm::{EmbeddingProvider, LlmProvider};
use convoy_vectorindex::types::FilterMap;
use convoy_vectorindex::VectorIndex;
use serde_json::json;

use crate::error::Result;
use crate::types::{RagAnswer, RagContext, RetrievedDocument};

const SEARCH_LIMIT: usize = 5;

/// The only public entry point that can attach an `org_id` filter to a
/// vector search, which is what structurally enforces tenant isolation
/// for `VectorIndex::search` (§4.J, §9 Open Question: "Vector tenant
/// filter").
pub struct RagRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndex>,
    org_id: String,
}

impl RagRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, vector_index: Arc<dyn VectorIndex>, org_id: String) -> Self {
        Self { embedder, vector_index, org_id }
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let vector = self.embedder.embed(query).await?;
        let mut filter = FilterMap::new();
        filter.insert("org_id".to_string(), json!(self.org_id));
        let hits = self.vector_index.search(&vector, SEARCH_LIMIT, filter).await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let content = hit.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let filename = hit.payload.get("filename").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                RetrievedDocument { content, filename, score: hit.score }
            })
            .collect())
    }
}

/// Builds the document-grounded augmented turn of §4.K step 4. `documents`
/// must be non-empty; callers skip straight to the raw query on a
/// zero-hit search.
fn build_augmented_turn(query: &str, documents: &[RetrievedDocument]) -> String {
    let mut excerpts = String::new();
    for (index, doc) in documents.iter().enumerate() {
        if index > 0 {
            excerpts.push_str("\n---\n");
        }
        excerpts.push_str(&format!("Document {} ({}): {}", index + 1, doc.filename, doc.content));
    }

    format!(
        "Answer the user's question using the document excerpts below. Cite the \
         document you draw from by number (e.g. \"Document 1\"). If the excerpts \
         don't contain the answer, say so and fall back to your general knowledge.\n\n\
         [DOCUMENT EXCERPTS]\n{excerpts}\n\n[USER QUESTION]\n{query}"
    )
}

fn unique_sources(documents: &[RetrievedDocument]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for doc in documents {
        if seen.insert(doc.filename.clone()) {
            out.push(doc.filename.clone());
        }
    }
    out
}

/// Unary RAG turn (§4.K steps 1-5).
pub async fn retrieve_and_answer(
    retriever: &RagRetriever,
    provider: &(dyn LlmProvider),
    prompt_name: &str,
    conversation: &[LlmMessage],
    query: &str,
) -> Result<RagAnswer> {
    let documents = retriever.search(query).await?;

    if documents.is_empty() {
        let mut messages = conversation.to_vec();
        messages.push(LlmMessage { role: convoy_llm::types::Role::User, content: query.to_string() });
        let outcome: ChatOutcome = provider.chat(&messages, prompt_name).await?;
        return Ok(RagAnswer { answer: outcome.text, documents: vec![], sources: vec![], usage: outcome.usage });
    }

    let augmented = build_augmented_turn(query, &documents);
    let mut messages = conversation.to_vec();
    messages.push(LlmMessage { role: convoy_llm::types::Role::User, content: augmented });

    let outcome = provider.chat(&messages, prompt_name).await?;
    let sources = unique_sources(&documents);

    Ok(RagAnswer { answer: outcome.text, documents, sources, usage: outcome.usage })
}

/// Resolves the retrieval half of the streaming path (§4.K "Streaming
/// path mirrors the unary one"). Returns the messages to stream plus the
/// `rag_context` to attach to the completion frame; the caller (the
/// gateway route) drives `convoy_streaming::stream_chat_turn` with them.
pub async fn prepare_stream_turn(
    retriever: &RagRetriever,
    conversation: &[LlmMessage],
    query: &str,
) -> Result<(Vec<LlmMessage>, RagContext)> {
    let documents = retriever.search(query).await?;

    let mut messages = conversation.to_vec();
    if documents.is_empty() {
        messages.push(LlmMessage { role: convoy_llm::types::Role::User, content: query.to_string() });
        return Ok((messages, RagContext { documents_used: 0, sources: vec![] }));
    }

    let augmented = build_augmented_turn(query, &documents);
    let sources = unique_sources(&documents);
    let documents_used = documents.len();
    messages.push(LlmMessage { role: convoy_llm::types::Role::User, content: augmented });

    Ok((messages, RagContext { documents_used, sources }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_llm::error::Result as LlmResult;
    use convoy_llm::stream::StreamOptions;
    use convoy_llm::types::Usage;
    use convoy_vectorindex::error::Result as VectorResult;
    use convoy_vectorindex::types::{ScoredPoint, VectorPoint};

    struct FakeEmbedder;
    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> LlmResult<Vec<f32>> {
            Ok(vec![0.1; convoy_llm::EMBEDDING_DIMENSIONS])
        }
    }

    struct FakeProvider {
        reply: String,
    }
    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        async fn chat(&self, _messages: &[LlmMessage], _prompt_name: &str) -> LlmResult<ChatOutcome> {
            Ok(ChatOutcome { text: self.reply.clone(), usage: Usage::default(), provider_name: "fake".into() })
        }
        async fn stream_chat(&self, _messages: &[LlmMessage], _opts: StreamOptions) -> LlmResult<()> {
            unimplemented!()
        }
    }

    struct TenantFilteredIndex;
    #[async_trait]
    impl VectorIndex for TenantFilteredIndex {
        async fn ensure_collection(&self) -> VectorResult<()> {
            Ok(())
        }
        async fn upsert(&self, _points: Vec<VectorPoint>) -> VectorResult<()> {
            Ok(())
        }
        async fn search(&self, _query: &[f32], _limit: usize, filter: FilterMap) -> VectorResult<Vec<ScoredPoint>> {
            let org_id = filter.get("org_id").and_then(|v| v.as_str()).unwrap_or_default();
            if org_id != "org-a" {
                return Ok(vec![]);
            }
            let mut payload = FilterMap::new();
            payload.insert("content".to_string(), json!("Transformers use self-attention."));
            payload.insert("filename".to_string(), json!("paper.pdf"));
            Ok(vec![ScoredPoint { id: "chunk-1".into(), score: 0.9, payload }])
        }
        async fn delete_by(&self, _filter: FilterMap) -> VectorResult<()> {
            Ok(())
        }
    }

    struct EmptyIndex;
    #[async_trait]
    impl VectorIndex for EmptyIndex {
        async fn ensure_collection(&self) -> VectorResult<()> {
            Ok(())
        }
        async fn upsert(&self, _points: Vec<VectorPoint>) -> VectorResult<()> {
            Ok(())
        }
        async fn search(&self, _query: &[f32], _limit: usize, _filter: FilterMap) -> VectorResult<Vec<ScoredPoint>> {
            Ok(vec![])
        }
        async fn delete_by(&self, _filter: FilterMap) -> VectorResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn zero_hits_falls_back_to_raw_query_with_empty_sources() {
        let retriever = RagRetriever::new(Arc::new(FakeEmbedder), Arc::new(EmptyIndex), "org-a".into());
        let provider = FakeProvider { reply: "general knowledge answer".into() };
        let result = retrieve_and_answer(&retriever, &provider, "chat", &[], "what is rust?").await.unwrap();
        assert_eq!(result.answer, "general knowledge answer");
        assert!(result.sources.is_empty());
        assert!(result.documents.is_empty());
    }

    #[tokio::test]
    async fn hits_produce_augmented_answer_with_sources() {
        let retriever = RagRetriever::new(Arc::new(FakeEmbedder), Arc::new(TenantFilteredIndex), "org-a".into());
        let provider = FakeProvider { reply: "Document 1 says self-attention.".into() };
        let result =
            retrieve_and_answer(&retriever, &provider, "chat", &[], "what do transformers use?").await.unwrap();
        assert_eq!(result.sources, vec!["paper.pdf".to_string()]);
        assert_eq!(result.documents.len(), 1);
        assert!(result.documents[0].content.contains("self-attention"));
    }

    #[tokio::test]
    async fn different_tenant_search_returns_zero_hits() {
        let retriever = RagRetriever::new(Arc::new(FakeEmbedder), Arc::new(TenantFilteredIndex), "org-b".into());
        let provider = FakeProvider { reply: "fallback".into() };
        let result = retrieve_and_answer(&retriever, &provider, "chat", &[], "anything").await.unwrap();
        assert!(result.documents.is_empty());
        assert!(result.sources.is_empty());
    }
}
