//! Key broker error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyBrokerError {
    #[error("key broker unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("permission denied for key: {0}")]
    PermissionDenied(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("malformed key material: {0}")]
    Encoding(String),
}

pub type KeyBrokerResult<T> = Result<T, KeyBrokerError>;

impl KeyBrokerError {
    /// Whether a retry of the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeyBrokerError::Unavailable(_) | KeyBrokerError::RateLimited | KeyBrokerError::Http(_)
        )
    }
}
