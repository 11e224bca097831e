//! Shared data models for the hand archive backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video segments and timecodes
//! - OCR region layouts
//! - Candidate hands returned by the external analyzer (validated at the boundary)
//! - Persisted hand/player/action records
//! - Analysis jobs and their status machines
//! - Pipeline progress events (SSE wire protocol)

pub mod candidate;
pub mod event;
pub mod ids;
pub mod job;
pub mod record;
pub mod regions;
pub mod segment;
pub mod timecode;

// Re-export common types
pub use candidate::{
    normalize_name, parse_chip_amount, ActionType, Board, CandidateAction, CandidateError,
    CandidateHand, CandidatePlayer, CandidateWinner, ParsedBlinds, Street,
};
pub use event::{CompleteData, HandData, PipelineEvent, ProgressData, StartData, StepData};
pub use ids::{HandId, JobId, PlayerId, StreamId};
pub use job::{AnalysisJob, JobStatus, RunnerStatus};
pub use record::{Hand, HandAction, HandPlayer, Player, StreamStatus};
pub use regions::{NormalizedRect, RegionError, RegionMap, SeatRegions};
pub use segment::{SegmentError, VideoSegment, MAX_BATCH_SEGMENT_SECS, MAX_SYNC_SEGMENT_SECS};
pub use timecode::{format_timecode, parse_timecode, TimecodeError};
