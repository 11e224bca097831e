//! Error types for pipeline runs.

use thiserror::Error;

use handarc_db::DbError;
use handarc_media::MediaError;
use handarc_models::{RegionError, SegmentError};
use handarc_vision::VisionError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors from a pipeline run, aggregating the layer-specific errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("client disconnected")]
    Disconnected,

    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether retrying the failed step may help, delegated to the layer
    /// that produced the error.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Media(e) => e.is_retryable(),
            PipelineError::Vision(e) => e.is_retryable(),
            PipelineError::Db(e) => e.is_retryable(),
            PipelineError::Segment(_)
            | PipelineError::Region(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::Disconnected => false,
            PipelineError::Join(_) => false,
        }
    }

    /// Server-requested backoff, when the underlying error carries one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            PipelineError::Vision(e) => e.retry_after_ms(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_errors_not_retryable() {
        let err = PipelineError::Segment(SegmentError::TooLong {
            requested: 200.0,
            limit: 180,
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_vision_rate_limit_propagates_backoff() {
        let err = PipelineError::Vision(VisionError::RateLimited {
            retry_after_ms: 1200,
        });
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_ms(), Some(1200));
    }

    #[test]
    fn test_media_timeout_retryable() {
        assert!(PipelineError::Media(MediaError::Timeout(300)).is_retryable());
    }
}
