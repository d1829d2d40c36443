use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Provider(#[from] convoy_llm::error::ProviderError),

    #[error(transparent)]
    VectorIndex(#[from] convoy_vectorindex::error::VectorIndexError),
}

impl From<RagError> for convoy_core::error::ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Provider(e) => e.into(),
            RagError::VectorIndex(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
