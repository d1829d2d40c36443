use std::sync::Arc;

use convoy_core::config::MAX_UPLOAD_BYTES;
use convoy_core::ids::{OrgId, UserId};
use convoy_jobqueue::JobQueue;
use convoy_repository::documents;
use convoy_repository::types::Document;
use convoy_repository::Repository;
use serde_json::json;

use crate::blob::BlobStore;
use crate::error::{IngestionError, Result};

const ALLOWED_MIME_TYPE: &str = "application/pdf";

/// Implements §4.I's synchronous upload path: validate, persist the blob,
/// write the `documents` row, then hand off parsing to the job queue.
#[allow(clippy::too_many_arguments)]
pub async fn upload_document(
    repository: &Repository,
    blob_store: &(dyn BlobStore),
    job_queue: &Arc<dyn JobQueue>,
    org_id: &OrgId,
    user_id: &UserId,
    filename: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Result<Document> {
    if mime_type != ALLOWED_MIME_TYPE {
        return Err(IngestionError::UnsupportedMimeType(mime_type.to_string()));
    }
    let size_bytes = bytes.len() as u64;
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(IngestionError::TooLarge { size_bytes, max_bytes: MAX_UPLOAD_BYTES });
    }

    let ext = filename.rsplit('.').next().unwrap_or("pdf");
    let blob_path = format!("{}/{}.{}", org_id.as_str(), uuid::Uuid::new_v4(), ext);
    blob_store.put(&blob_path, bytes).await?;

    let document = repository
        .with_conn(|conn| documents::create(conn, org_id, user_id, filename, mime_type, size_bytes, &blob_path))?;

    job_queue
        .enqueue(
            "parse-document",
            json!({ "document_id": document.id.as_str(), "org_id": org_id.as_str() }),
            Some(&format!("doc-{}", document.id.as_str())),
        )
        .await?;

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_core::role::Role;
    use convoy_jobqueue::error::Result as JobResult;
    use convoy_jobqueue::{JobId, ReservedJob};
    use rusqlite::Connection;
    use std::sync::Mutex as StdMutex;

    struct InMemoryBlobStore {
        written: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl InMemoryBlobStore {
        fn new() -> Self {
            Self { written: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl BlobStore for InMemoryBlobStore {
        async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
            self.written.lock().unwrap().push((path.to_string(), bytes.to_vec()));
            Ok(())
        }

        async fn get(&self, path: &str) -> Result<Vec<u8>> {
            self.written
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, b)| b.clone())
                .ok_or_else(|| IngestionError::Blob("not found".to_string()))
        }
    }

    struct RecordingJobQueue {
        enqueued: StdMutex<Vec<(String, serde_json::Value, Option<String>)>>,
    }

    impl RecordingJobQueue {
        fn new() -> Self {
            Self { enqueued: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl JobQueue for RecordingJobQueue {
        async fn enqueue(&self, kind: &str, payload: serde_json::Value, dedup_key: Option<&str>) -> JobResult<JobId> {
            self.enqueued
                .lock()
                .unwrap()
                .push((kind.to_string(), payload, dedup_key.map(str::to_string)));
            Ok(JobId("job-1".to_string()))
        }

        async fn reserve(&self, _kind: &str) -> JobResult<Option<ReservedJob>> {
            Ok(None)
        }

        async fn ack(&self, _id: &JobId) -> JobResult<()> {
            Ok(())
        }

        async fn fail(&self, _id: &JobId, _error: &str) -> JobResult<()> {
            Ok(())
        }
    }

    fn test_repo() -> Repository {
        Repository::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn rejects_non_pdf_mime_type() {
        let repo = test_repo();
        let org = repo.with_conn(|c| convoy_repository::organizations::create(c, "A", "a")).unwrap();
        let user = repo
            .with_conn(|c| convoy_repository::users::create(c, &org.id, "a@a.com", "A", Role::Owner))
            .unwrap();
        let blob = InMemoryBlobStore::new();
        let queue: Arc<dyn JobQueue> = Arc::new(RecordingJobQueue::new());

        let result = upload_document(&repo, &blob, &queue, &org.id, &user.id, "doc.txt", "text/plain", b"hi").await;
        assert!(matches!(result, Err(IngestionError::UnsupportedMimeType(_))));
    }

    #[tokio::test]
    async fn rejects_oversized_upload() {
        let repo = test_repo();
        let org = repo.with_conn(|c| convoy_repository::organizations::create(c, "A", "a")).unwrap();
        let user = repo
            .with_conn(|c| convoy_repository::users::create(c, &org.id, "a@a.com", "A", Role::Owner))
            .unwrap();
        let blob = InMemoryBlobStore::new();
        let queue: Arc<dyn JobQueue> = Arc::new(RecordingJobQueue::new());
        let oversized = vec![0u8; (MAX_UPLOAD_BYTES + 1) as usize];

        let result =
            upload_document(&repo, &blob, &queue, &org.id, &user.id, "doc.pdf", "application/pdf", &oversized).await;
        assert!(matches!(result, Err(IngestionError::TooLarge { .. })));
    }

    #[tokio::test]
    async fn uploads_and_enqueues_parse_job() {
        let repo = test_repo();
        let org = repo.with_conn(|c| convoy_repository::organizations::create(c, "A", "a")).unwrap();
        let user = repo
            .with_conn(|c| convoy_repository::users::create(c, &org.id, "a@a.com", "A", Role::Owner))
            .unwrap();
        let blob = InMemoryBlobStore::new();
        let queue: Arc<dyn JobQueue> = Arc::new(RecordingJobQueue::new());

        let document =
            upload_document(&repo, &blob, &queue, &org.id, &user.id, "doc.pdf", "application/pdf", b"%PDF-1.4")
                .await
                .unwrap();

        assert_eq!(document.state, convoy_repository::types::DocumentState::Uploaded);
        assert_eq!(blob.written.lock().unwrap().len(), 1);
    }
}
