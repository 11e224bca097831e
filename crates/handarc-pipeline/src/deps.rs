//! Shared dependency bundle for pipeline runs.

use std::sync::Arc;

use handarc_db::HandStore;
use handarc_media::{FrameSource, OcrEngine, VideoResolver};
use handarc_vision::{BatchSubmitter, HandAnalyzer, JobRunner};

/// Everything a pipeline run needs, behind trait objects so runs can be
/// spawned onto the runtime and tests can substitute in-process fakes.
#[derive(Clone)]
pub struct PipelineDeps {
    pub resolver: Arc<dyn VideoResolver>,
    pub frames: Arc<dyn FrameSource>,
    pub ocr: Arc<dyn OcrEngine>,
    pub analyzer: Arc<dyn HandAnalyzer>,
    pub batch: Arc<dyn BatchSubmitter>,
    pub runner: Arc<dyn JobRunner>,
    pub store: Arc<dyn HandStore>,
}
