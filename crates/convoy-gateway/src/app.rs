use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use convoy_core::config::Config;
use convoy_ingestion::BlobStore;
use convoy_jobqueue::JobQueue;
use convoy_kvstore::KvStore;
use convoy_llm::health::HealthTracker;
use convoy_llm::EmbeddingProvider;
use convoy_memory::MemoryEngine;
use convoy_quota::QuotaEngine;
use convoy_repository::Repository;
use convoy_vectorindex::VectorIndex;
use convoy_chatservice::ChatService;

/// Central shared state, passed as `Arc<AppState>` to every handler — the
/// whole struct is wrapped once in `Arc` and cloned via axum's `State`
/// extractor, rather than wrapping each field individually, matching
/// `skynet_gateway::app::AppState`.
pub struct AppState {
    pub config: Config,
    pub repository: Repository,
    pub quota: Arc<QuotaEngine>,
    pub memory: Arc<MemoryEngine>,
    pub chat_service: ChatService,
    pub health: Arc<HealthTracker>,
    pub blob_store: Arc<dyn BlobStore>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub job_queue: Arc<dyn JobQueue>,
    pub kv: Arc<dyn KvStore>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        config: Config,
        repository: Repository,
        quota: Arc<QuotaEngine>,
        memory: Arc<MemoryEngine>,
        chat_service: ChatService,
        health: Arc<HealthTracker>,
        blob_store: Arc<dyn BlobStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        job_queue: Arc<dyn JobQueue>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            config,
            repository,
            quota,
            memory,
            chat_service,
            health,
            blob_store,
            vector_index,
            embedder,
            job_queue,
            kv,
        }
    }
}

/// Assembles the full router (§6). Every route but the health probe and
/// metrics exposition requires identity via the `Protected` extractor.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/metrics", get(crate::http::metrics::metrics_handler))
        .route("/chat", post(crate::http::chat::chat_turn))
        .route("/chat/stream", post(crate::http::chat::chat_turn_streaming))
        .route("/chat/rag", post(crate::http::chat::rag_turn))
        .route("/chat/rag/stream", post(crate::http::chat::rag_turn_streaming))
        .route("/chats", get(crate::http::chats::list_chats))
        .route(
            "/chats/{chat_id}",
            get(crate::http::chats::get_chat).put(crate::http::chats::update_chat).delete(crate::http::chats::delete_chat),
        )
        .route("/documents", post(crate::http::documents::upload_document).get(crate::http::documents::list_documents))
        .route(
            "/documents/{document_id}",
            get(crate::http::documents::get_document).delete(crate::http::documents::delete_document),
        )
        .route("/documents/search", post(crate::http::documents::search_documents))
        .route("/prompts/{name}", get(crate::http::prompts::list_versions).post(crate::http::prompts::create_version))
        .route("/prompts/{name}/activate", post(crate::http::prompts::activate_version))
        .route("/quota", get(crate::http::quota::peek_quota))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
