//! Vision AI clients for hand detection.
//!
//! Two paths talk to the vision model:
//! - The synchronous analyzer sends one request per run and waits for the
//!   candidate hands inline.
//! - The batch submitter packs frames into JSONL batch requests for long
//!   segments and polls for results later.
//!
//! Both return [`handarc_models::CandidateHand`] values which are validated
//! downstream, never trusted here.

pub mod analyzer;
pub mod batch;
pub mod error;
pub mod runner;

pub use analyzer::{AnalysisRequest, FramePayload, HandAnalyzer, HttpHandAnalyzer};
pub use batch::{
    estimate_batch_cost, BatchRequest, BatchState, BatchSubmitter, VisionBatchClient,
    FRAMES_PER_REQUEST,
};
pub use error::{VisionError, VisionResult};
pub use runner::{HttpJobRunner, JobRunner, RunnerRun, RunnerSubmission};
