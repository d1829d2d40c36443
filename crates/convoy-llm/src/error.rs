use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request deadline exceeded")]
    Timeout,
}

impl ProviderError {
    /// Whether this failure is eligible for failover to the next provider
    /// in a `ProviderRouter` chain (§4.G "Fallback chain").
    pub fn is_retriable(&self) -> bool {
        !matches!(self, ProviderError::Api { status, .. } if *status < 500)
    }
}

impl From<ProviderError> for convoy_core::error::ApiError {
    fn from(err: ProviderError) -> Self {
        convoy_core::error::ApiError::Upstream {
            message: err.to_string(),
            fallback_attempted: false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
