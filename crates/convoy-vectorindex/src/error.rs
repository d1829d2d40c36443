use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("qdrant error: {0}")]
    Client(String),
}

impl From<VectorIndexError> for convoy_core::error::ApiError {
    fn from(err: VectorIndexError) -> Self {
        convoy_core::error::ApiError::Internal(format!("vector index error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, VectorIndexError>;
