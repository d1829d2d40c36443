use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl From<KvError> for convoy_core::error::ApiError {
    fn from(err: KvError) -> Self {
        convoy_core::error::ApiError::Internal(format!("kv store error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, KvError>;
