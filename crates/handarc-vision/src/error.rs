//! Error types for vision AI operations.

use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors from the vision analyzer, batch API and job runner.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("response parse failed: {0}")]
    Parse(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("batch {0} is not ready")]
    BatchNotReady(String),

    #[error("batch {batch_id} failed: {message}")]
    BatchFailed { batch_id: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VisionError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the call may succeed if retried. Server-side failures and
    /// rate limits are transient; bad configuration and malformed
    /// responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            VisionError::Http(e) => e.is_timeout() || e.is_connect(),
            VisionError::Api { status, .. } => *status >= 500 || *status == 429,
            VisionError::RateLimited { .. } => true,
            VisionError::Config(_)
            | VisionError::Parse(_)
            | VisionError::EmptyResponse
            | VisionError::BatchNotReady(_)
            | VisionError::BatchFailed { .. }
            | VisionError::Json(_) => false,
        }
    }

    /// Server-requested backoff, when one was given.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            VisionError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(VisionError::api(503, "overloaded").is_retryable());
        assert!(VisionError::api(429, "slow down").is_retryable());
        assert!(VisionError::RateLimited {
            retry_after_ms: 2000
        }
        .is_retryable());
        assert!(!VisionError::api(400, "bad request").is_retryable());
        assert!(!VisionError::Parse("garbage".to_string()).is_retryable());
        assert!(!VisionError::config("missing key").is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = VisionError::RateLimited {
            retry_after_ms: 1500,
        };
        assert_eq!(err.retry_after_ms(), Some(1500));
        assert_eq!(VisionError::EmptyResponse.retry_after_ms(), None);
    }
}
