use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for convoy_core::error::ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => convoy_core::error::ApiError::NotFound,
            RepositoryError::InvalidTransition(msg) => convoy_core::error::ApiError::Validation(msg),
            RepositoryError::Conflict(msg) => convoy_core::error::ApiError::Validation(msg),
            RepositoryError::Database(e) => {
                convoy_core::error::ApiError::Internal(format!("database error: {e}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
