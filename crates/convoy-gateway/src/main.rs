use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

mod app;
mod envelope_ext;
mod error;
mod http;

use convoy_chatservice::{ChatService, RagComponents};
use convoy_core::config::Config;
use convoy_ingestion::{LocalFsBlobStore, parse_document_job};
use convoy_jobqueue::{JobWorkerPool, SqliteJobQueue};
use convoy_kvstore::SqliteKvStore;
use convoy_llm::health::HealthTracker;
use convoy_llm::providers::{ClaudeProvider, GeminiProvider, LocalProvider};
use convoy_llm::{LlmProvider, ProviderRouter, ProviderSlot};
use convoy_memory::MemoryEngine;
use convoy_quota::QuotaEngine;
use convoy_repository::Repository;
use convoy_vectorindex::QdrantIndex;

const PROVIDER_MAX_RETRIES: u32 = 1;

/// Builds one chat provider from its configured name (§4.G, §9
/// "polymorphism over the LLM provider set"). `"local"` is the only
/// variant with no required external credentials, so it also serves as
/// the inert fallback if a provider name is misconfigured.
fn build_provider(name: &str, config: &Config) -> Box<dyn LlmProvider> {
    match name {
        "claude" => match &config.llm.claude {
            Some(c) => Box::new(ClaudeProvider::new(c.api_key.clone(), c.model.clone())),
            None => {
                warn!("llm.primary_provider or fallback_provider is \"claude\" but no [llm.claude] config is set, falling back to local");
                Box::new(LocalProvider::new(config.llm.local.base_url.clone(), config.llm.local.model.clone()))
            }
        },
        "gemini" => match &config.llm.gemini {
            Some(c) => Box::new(GeminiProvider::new(c.api_key.clone(), c.model.clone())),
            None => {
                warn!("llm.primary_provider or fallback_provider is \"gemini\" but no [llm.gemini] config is set, falling back to local");
                Box::new(LocalProvider::new(config.llm.local.base_url.clone(), config.llm.local.model.clone()))
            }
        },
        _ => Box::new(LocalProvider::new(config.llm.local.base_url.clone(), config.llm.local.model.clone())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convoy_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("CONVOY_CONFIG").ok();
    let config = Config::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        Config::default()
    });

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = std::path::Path::new(&config.storage.blob_root).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let repository = Repository::new(rusqlite::Connection::open(&config.database.path)?)?;

    // KV store and job queue get their own SQLite connection/file rather
    // than sharing the repository's: they are independent tables with
    // their own write patterns (TTL sweeps, job polling) and keeping them
    // off the repository's single mutex avoids contending the chat path
    // on every quota check and job poll (see DESIGN.md).
    let kv_path = format!("{}.kv", config.database.path);
    let kv_store = SqliteKvStore::new(rusqlite::Connection::open(&kv_path)?)?;
    let kv: Arc<dyn convoy_kvstore::KvStore> = Arc::new(kv_store);

    let jobs_path = format!("{}.jobs", config.database.path);
    let job_queue_impl = SqliteJobQueue::new(rusqlite::Connection::open(&jobs_path)?)?;
    let job_queue: Arc<dyn convoy_jobqueue::JobQueue> = Arc::new(job_queue_impl);

    let quota = Arc::new(QuotaEngine::new(
        kv.clone(),
        config.quota.capacity,
        config.quota.refill_rate,
        config.quota.ttl_secs,
    ));
    let memory = Arc::new(MemoryEngine::new(
        kv.clone(),
        config.memory.max_context_tokens,
        config.memory.message_count_threshold,
        config.memory.token_threshold,
        config.memory.resummarize_delta_messages,
    ));

    let health = Arc::new(HealthTracker::new());

    let mut slots = vec![ProviderSlot::new(build_provider(&config.llm.primary_provider, &config), PROVIDER_MAX_RETRIES)];
    if let Some(fallback_name) = &config.llm.fallback_provider {
        slots.push(ProviderSlot::new(build_provider(fallback_name, &config), PROVIDER_MAX_RETRIES));
    }
    let provider_router = Arc::new(ProviderRouter::with_health_tracker(slots, health.clone()));

    // The local provider is the workspace's only `EmbeddingProvider`
    // (§9 "an embedding capability on the local provider"), so embeddings
    // always go through it regardless of which provider serves chat
    // completions.
    let embedder: Arc<dyn convoy_llm::EmbeddingProvider> =
        Arc::new(LocalProvider::new(config.llm.local.base_url.clone(), config.llm.local.model.clone()));

    let vector_index: Arc<dyn convoy_vectorindex::VectorIndex> = Arc::new(QdrantIndex::new(
        &config.vector.url,
        config.vector.api_key.clone(),
        config.vector.collection_name.clone(),
        convoy_llm::EMBEDDING_DIMENSIONS as u64,
    )?);
    if let Err(e) = vector_index.ensure_collection().await {
        warn!("failed to ensure vector collection exists at startup: {e}");
    }

    let blob_store: Arc<dyn convoy_ingestion::BlobStore> = Arc::new(LocalFsBlobStore::new(config.storage.blob_root.clone()));

    let chat_service = ChatService::new(
        repository.clone(),
        quota.clone(),
        memory.clone(),
        provider_router,
        Some(RagComponents { embedder: embedder.clone(), vector_index: vector_index.clone() }),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_parse_document_workers(
        repository.clone(),
        blob_store.clone(),
        embedder.clone(),
        vector_index.clone(),
        job_queue.clone(),
        config.ingestion.chunk_size,
        config.ingestion.chunk_overlap,
        config.ingestion.parse_concurrency,
        shutdown_rx,
    );

    let state = Arc::new(app::AppState::new(
        config.clone(),
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
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("Convoy gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Wires the `"parse-document"` job kind to `convoy_ingestion`'s handler
/// (§4.I, §5: "2 concurrent workers"). The reserved job's JSON payload
/// carries `document_id`/`org_id`; a malformed payload is a programmer
/// error in the enqueue side, not a transient failure, so it is not
/// retried.
#[allow(clippy::too_many_arguments)]
fn spawn_parse_document_workers(
    repository: Repository,
    blob_store: Arc<dyn convoy_ingestion::BlobStore>,
    embedder: Arc<dyn convoy_llm::EmbeddingProvider>,
    vector_index: Arc<dyn convoy_vectorindex::VectorIndex>,
    job_queue: Arc<dyn convoy_jobqueue::JobQueue>,
    chunk_size: usize,
    chunk_overlap: usize,
    concurrency: usize,
    shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let pool = JobWorkerPool::new(job_queue);
    pool.spawn(
        "parse-document",
        concurrency,
        move |job| {
            let repository = repository.clone();
            let blob_store = blob_store.clone();
            let embedder = embedder.clone();
            let vector_index = vector_index.clone();
            async move {
                let document_id = job
                    .payload
                    .get("document_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "parse-document job payload missing document_id".to_string())?;
                let org_id = job
                    .payload
                    .get("org_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "parse-document job payload missing org_id".to_string())?;

                parse_document_job(
                    &repository,
                    blob_store,
                    embedder,
                    vector_index,
                    org_id.into(),
                    document_id.into(),
                    chunk_size,
                    chunk_overlap,
                )
                .await
                .map_err(|e| e.to_string())
            }
        },
        shutdown,
    );
}
