use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("job not found: {0}")]
    NotFound(String),
}

impl From<JobQueueError> for convoy_core::error::ApiError {
    fn from(err: JobQueueError) -> Self {
        match err {
            JobQueueError::NotFound(_) => convoy_core::error::ApiError::NotFound,
            JobQueueError::Database(e) => {
                convoy_core::error::ApiError::Internal(format!("job queue error: {e}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, JobQueueError>;
