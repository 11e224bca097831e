//! Bounded time windows of source video submitted for extraction/analysis.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum segment duration for the synchronous analysis path. Keeps total
/// pipeline latency under the caller's connection timeout.
pub const MAX_SYNC_SEGMENT_SECS: u64 = 180;

/// Maximum segment duration for the asynchronous batch path.
pub const MAX_BATCH_SEGMENT_SECS: u64 = 3600;

#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("segment end ({end:.1}s) must be after start ({start:.1}s)")]
    Inverted { start: f64, end: f64 },

    #[error("segment too long: {requested:.0}s exceeds the {limit}s limit")]
    TooLong { requested: f64, limit: u64 },
}

/// A bounded time window of source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegment {
    /// Start offset in seconds from the beginning of the video.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    /// Optional human label ("Final table", "Day 2 level 14", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl VideoSegment {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            label: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end - self.start
    }

    /// Validate the segment against a path-specific duration budget.
    /// Fails fast before any decode work starts.
    pub fn validate(&self, max_duration_secs: u64) -> Result<(), SegmentError> {
        if self.end <= self.start {
            return Err(SegmentError::Inverted {
                start: self.start,
                end: self.end,
            });
        }
        if self.duration_secs() > max_duration_secs as f64 {
            return Err(SegmentError::TooLong {
                requested: self.duration_secs(),
                limit: max_duration_secs,
            });
        }
        Ok(())
    }
}
