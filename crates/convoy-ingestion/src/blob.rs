use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{IngestionError, Result};

/// Tenant-scoped blob storage, kept local to this crate since the
/// persistent object store is out-of-scope plumbing. `LocalFsBlobStore`
/// is the only implementation — swapping in S3/GCS later only means a
/// new impl of this trait.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Vec<u8>>;
}

/// Stores blobs under `{root}/{org_id}/{uuid}.{ext}` (§4.I step 2).
pub struct LocalFsBlobStore {
    root: std::path::PathBuf,
}

impl LocalFsBlobStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalFsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestionError::Blob(format!("mkdir failed: {e}")))?;
        }
        let mut file = tokio::fs::File::create(&full_path)
            .await
            .map_err(|e| IngestionError::Blob(format!("create failed: {e}")))?;
        file.write_all(bytes)
            .await
            .map_err(|e| IngestionError::Blob(format!("write failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.root.join(path);
        let mut file = tokio::fs::File::open(&full_path)
            .await
            .map_err(|e| IngestionError::Blob(format!("open failed: {e}")))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| IngestionError::Blob(format!("read failed: {e}")))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempdir();
        let store = LocalFsBlobStore::new(dir.path().to_path_buf());
        store.put("org-1/doc.pdf", b"hello").await.unwrap();
        let read = store.get("org-1/doc.pdf").await.unwrap();
        assert_eq!(read, b"hello");
    }

    #[tokio::test]
    async fn get_missing_path_fails() {
        let dir = tempdir();
        let store = LocalFsBlobStore::new(dir.path().to_path_buf());
        assert!(store.get("org-1/missing.pdf").await.is_err());
    }

    /// Minimal disposable-directory helper; this crate has no dependency
    /// on `tempfile`, so this mirrors the teacher's avoidance of adding a
    /// dev-only crate for a single test fixture.
    fn tempdir() -> TempDirGuard {
        let path = std::env::temp_dir().join(format!("convoy-ingestion-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        TempDirGuard(path)
    }

    struct TempDirGuard(std::path::PathBuf);
    impl TempDirGuard {
        fn path(&self) -> &std::path::Path {
            &self.0
        }
    }
    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}
