use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Repository(#[from] convoy_repository::error::RepositoryError),

    #[error(transparent)]
    Provider(#[from] convoy_llm::error::ProviderError),

    #[error("kv store error: {0}")]
    Kv(#[from] convoy_kvstore::error::KvError),
}

impl From<MemoryError> for convoy_core::error::ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Repository(e) => e.into(),
            MemoryError::Provider(e) => e.into(),
            MemoryError::Kv(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
