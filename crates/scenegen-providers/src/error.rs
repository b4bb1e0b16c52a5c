//! Provider error types.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised inside an adapter.
///
/// These never cross the [`ProviderAdapter`](crate::ProviderAdapter)
/// boundary; adapters fold them into `None`, `Unknown` or `false`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Rejected by provider (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Truncated download: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Classify a non-success HTTP status.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited(message),
            401 | 403 => Self::Auth(message),
            500..=599 => Self::Server(status, message),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, message)),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Server(_, _)
                | ProviderError::Truncated { .. }
                | ProviderError::Io(_)
        )
    }

    /// Short label used as a metrics outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Network(_) => "network",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Server(_, _) => "server",
            ProviderError::Auth(_) => "auth",
            ProviderError::RequestFailed(_) => "request_failed",
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::InvalidResponse(_) | ProviderError::Json(_) => "invalid_response",
            ProviderError::Truncated { .. } => "truncated",
            ProviderError::Unsupported(_) => "unsupported",
            ProviderError::Config(_) => "config",
            ProviderError::Io(_) => "io",
        }
    }
}
