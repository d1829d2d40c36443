use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("file too large: {size_bytes} bytes exceeds the {max_bytes} byte limit")]
    TooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Repository(#[from] convoy_repository::error::RepositoryError),

    #[error(transparent)]
    Provider(#[from] convoy_llm::error::ProviderError),

    #[error(transparent)]
    VectorIndex(#[from] convoy_vectorindex::error::VectorIndexError),

    #[error(transparent)]
    JobQueue(#[from] convoy_jobqueue::error::JobQueueError),
}

impl From<IngestionError> for convoy_core::error::ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::UnsupportedMimeType(m) => {
                convoy_core::error::ApiError::Validation(format!("unsupported mime type: {m}"))
            }
            IngestionError::TooLarge { size_bytes, max_bytes } => convoy_core::error::ApiError::Validation(
                format!("file too large: {size_bytes} bytes exceeds the {max_bytes} byte limit"),
            ),
            IngestionError::Repository(e) => e.into(),
            IngestionError::Provider(e) => e.into(),
            IngestionError::VectorIndex(e) => e.into(),
            IngestionError::JobQueue(e) => e.into(),
            other => convoy_core::error::ApiError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
