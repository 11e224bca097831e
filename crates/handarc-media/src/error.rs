//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("tesseract not found in PATH")]
    TesseractNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("tesseract failed: {message}")]
    OcrFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("stream URL resolution failed: {message}")]
    ResolveFailed { message: String },

    #[error("no frames extracted from segment")]
    NoFramesExtracted,

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a resolution failure error.
    pub fn resolve_failed(message: impl Into<String>) -> Self {
        Self::ResolveFailed {
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if retried. Missing binaries and
    /// malformed inputs are permanent; subprocess failures, timeouts and IO
    /// errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::YtDlpNotFound
            | MediaError::TesseractNotFound
            | MediaError::FileNotFound(_)
            | MediaError::InvalidVideo(_)
            | MediaError::ImageDecode(_)
            | MediaError::JsonParse(_) => false,
            MediaError::FfmpegFailed { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::OcrFailed { .. }
            | MediaError::ResolveFailed { .. }
            | MediaError::NoFramesExtracted
            | MediaError::Timeout(_)
            | MediaError::Io(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MediaError::Timeout(120).is_retryable());
        assert!(MediaError::NoFramesExtracted.is_retryable());
        assert!(!MediaError::FfmpegNotFound.is_retryable());
        assert!(!MediaError::FileNotFound(PathBuf::from("/tmp/x.mp4")).is_retryable());
    }
}
