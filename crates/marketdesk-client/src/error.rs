use marketdesk_cache::CacheError;
use marketdesk_models::{UnknownAgentType, UnknownMarket};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Rejected before any request was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ClientError::NotFound(message.into())
    }

    /// Text shown to the user. Server messages are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(m) | ClientError::NotFound(m) | ClientError::Network(m) => {
                m.clone()
            }
            ClientError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Network(format!("request timed out: {e}"))
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<UnknownAgentType> for ClientError {
    fn from(e: UnknownAgentType) -> Self {
        ClientError::Validation(e.to_string())
    }
}

impl From<UnknownMarket> for ClientError {
    fn from(e: UnknownMarket) -> Self {
        ClientError::Validation(e.to_string())
    }
}
