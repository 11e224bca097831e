//! Extraction pipeline orchestration.
//!
//! Ties the media, vision and persistence crates together into the two
//! user-facing runs:
//! - [`analyze::run_analysis`]: synchronous analysis of a short segment,
//!   streaming progress events until a terminal `complete`/`error`.
//! - [`extract::run_extraction`]: the long-segment path that samples and
//!   OCRs frames, then hands the vision work to the batch API; results are
//!   reconciled later via [`bridge`].

pub mod analyze;
pub mod bridge;
pub mod config;
pub mod deps;
pub mod error;
pub mod extract;
pub mod progress;
pub mod retry;

pub use analyze::{run_analysis, AnalyzeRequest};
pub use bridge::{poll_job, reconcile_job, submit_job, ReconcileOutcome, SubmitJobRequest};
pub use config::PipelineConfig;
pub use deps::PipelineDeps;
pub use error::{PipelineError, PipelineResult};
pub use extract::{run_extraction, ExtractRequest};
pub use progress::{progress_channel, ProgressSender};
pub use retry::{with_retry, RetryConfig};
