//! Error types for the embedding client

use std::time::Duration;

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Every variant is a hard failure for the operation that requested the
/// embedding. Callers decide whether to retry; the client itself never does
/// beyond the documented endpoint fallback.
///
/// # Error Categories
///
/// - **Configuration Errors**: invalid base URL, model or timeout
/// - **Transport Errors**: connection failures and timeouts
/// - **Protocol Errors**: non-2xx responses and payloads that are not embeddings
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the client configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The request did not complete within the configured timeout
    #[error("Embedding request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// Connection or protocol failure below the HTTP status level
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// The embedding service answered with a non-success status
    #[error("Embedding service returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted as an embedding
    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a malformed response error with a custom message.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Convert a transport error, separating timeouts from other failures.
    pub fn from_transport(source: reqwest::Error, endpoint: &str, timeout: Duration) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
                timeout,
            }
        } else {
            Self::Http { source }
        }
    }
}
