//! Long-segment extraction.
//!
//! Samples and OCRs frames exactly like the synchronous path, but hands
//! the vision work to the provider's batch API instead of waiting for it.
//! The terminal `complete` event carries the batch id; hands arrive later
//! when [`crate::bridge::reconcile_job`] picks up the finished batch.

use std::time::Instant;

use tracing::{error, info};

use handarc_media::{cleanup::CleanupContext, crop_frame, ocr_accuracy, FrameReading};
use handarc_models::{
    CompleteData, RegionMap, StreamId, StreamStatus, VideoSegment, MAX_BATCH_SEGMENT_SECS,
};
use handarc_vision::{estimate_batch_cost, BatchRequest, FramePayload};

use crate::analyze::{estimated_run_time, retry_reporter};
use crate::deps::PipelineDeps;
use crate::error::PipelineResult;
use crate::progress::ProgressSender;
use crate::retry::{with_retry, RetryConfig};

/// Steps reported by the extraction run.
const TOTAL_STEPS: u32 = 6;

/// A long-segment extraction request.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub stream_id: StreamId,
    pub url: String,
    pub segment: VideoSegment,
    pub regions: RegionMap,
}

/// Run the extraction pipeline. Returns the submitted batch id on success
/// so the caller (the job runner harness) can report it as run output.
pub async fn run_extraction(
    deps: PipelineDeps,
    progress: ProgressSender,
    request: ExtractRequest,
) -> Option<String> {
    let cleanup = CleanupContext::new();
    let started = Instant::now();

    let result = run_steps(&deps, &progress, &request, &cleanup, started).await;
    cleanup.cleanup().await;

    match result {
        Ok(batch_id) => Some(batch_id),
        Err(e) => {
            error!("Extraction for stream {} failed: {}", request.stream_id, e);
            progress.error(e.to_string(), None);
            if let Err(status_err) = deps
                .store
                .update_stream_status(&request.stream_id, StreamStatus::Failed)
                .await
            {
                error!(
                    "Failed to mark stream {} failed: {}",
                    request.stream_id, status_err
                );
            }
            None
        }
    }
}

async fn run_steps(
    deps: &PipelineDeps,
    progress: &ProgressSender,
    request: &ExtractRequest,
    cleanup: &CleanupContext,
    started: Instant,
) -> PipelineResult<String> {
    let duration = request.segment.duration_secs();
    progress.start(
        Some(request.stream_id.to_string()),
        duration,
        estimated_run_time(duration),
    );

    request.segment.validate(MAX_BATCH_SEGMENT_SECS)?;
    request.regions.validate()?;
    deps.store
        .ensure_stream(&request.stream_id, &request.url)
        .await?;

    // Step 1: resolve the stream URL
    progress.progress(1, TOTAL_STEPS, "Resolving stream URL");
    let resolved = with_retry(
        &RetryConfig::media(),
        "resolve",
        retry_reporter(progress, 1, TOTAL_STEPS),
        || async { Ok(deps.resolver.resolve(&request.url).await?) },
    )
    .await?;
    progress.step_complete(1, "Stream URL resolved");

    // Step 2: sample frames
    progress.progress(2, TOTAL_STEPS, "Sampling frames");
    let sampled = with_retry(
        &RetryConfig::media(),
        "sample_frames",
        retry_reporter(progress, 2, TOTAL_STEPS),
        || async {
            Ok(deps
                .frames
                .sample(&resolved.url, &request.segment, cleanup)
                .await?)
        },
    )
    .await?;
    progress.step_complete(2, format!("{} frames sampled", sampled.frames.len()));

    // Step 3: crop regions
    progress.progress(3, TOTAL_STEPS, "Cropping overlay regions");
    let mut all_crops = Vec::with_capacity(sampled.frames.len());
    for frame in &sampled.frames {
        let frame = frame.clone();
        let regions = request.regions.clone();
        all_crops.push(tokio::task::spawn_blocking(move || crop_frame(&frame, &regions)).await??);
    }
    progress.step_complete(3, "Regions cropped");

    // Step 4: OCR
    progress.progress(4, TOTAL_STEPS, "Reading broadcast overlays");
    let readings = with_retry(
        &RetryConfig::ocr(),
        "ocr",
        retry_reporter(progress, 4, TOTAL_STEPS),
        || async {
            let mut readings = Vec::with_capacity(all_crops.len());
            for (index, crops) in all_crops.iter().enumerate() {
                readings.push(FrameReading::from_crops(deps.ocr.as_ref(), index, crops).await?);
            }
            Ok(readings)
        },
    )
    .await?;
    let accuracy = ocr_accuracy(&readings);
    progress.step_complete(4, format!("Overlays read ({:.0}% usable)", accuracy * 100.0));

    // Step 5: pack batch requests
    progress.progress(5, TOTAL_STEPS, "Packing analysis batch");
    let mut frames = Vec::with_capacity(sampled.frames.len());
    for (index, path) in sampled.frames.iter().enumerate() {
        frames.push(FramePayload {
            index,
            offset_secs: sampled.frame_offset(&request.segment, index),
            jpeg: tokio::fs::read(path)
                .await
                .map_err(handarc_media::MediaError::from)?,
        });
    }
    let requests = BatchRequest::pack(&frames, &readings);
    progress.step_complete(
        5,
        format!(
            "{} batch requests packed (est. ${:.4})",
            requests.len(),
            estimate_batch_cost(frames.len())
        ),
    );

    // Step 6: submit
    progress.progress(6, TOTAL_STEPS, "Submitting analysis batch");
    let batch_id = with_retry(
        &RetryConfig::vision(),
        "submit_batch",
        retry_reporter(progress, 6, TOTAL_STEPS),
        || async { Ok(deps.batch.submit(&requests).await?) },
    )
    .await?;
    progress.step_complete(6, format!("Batch {} submitted", batch_id));

    info!(
        "Extraction for stream {} submitted batch {} ({} frames)",
        request.stream_id,
        batch_id,
        frames.len()
    );

    progress.complete(CompleteData {
        total_hands: 0,
        saved_hands: 0,
        success_rate: 0.0,
        processing_time_ms: started.elapsed().as_millis() as u64,
        average_confidence: None,
        batch_id: Some(batch_id.clone()),
        frame_count: Some(frames.len() as u32),
        ocr_accuracy: Some(accuracy),
    });

    Ok(batch_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::progress_channel;
    use async_trait::async_trait;
    use handarc_db::MemoryHandStore;
    use handarc_media::{
        FrameSource, MediaError, MediaResult, OcrEngine, ResolvedVideo, SampledFrames,
        VideoResolver,
    };
    use handarc_models::{NormalizedRect, PipelineEvent, SeatRegions};
    use handarc_vision::{
        BatchState, BatchSubmitter, HandAnalyzer, JobRunner, RunnerRun, RunnerSubmission,
        VisionError, VisionResult, FRAMES_PER_REQUEST,
    };
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct DirectResolver;

    #[async_trait]
    impl VideoResolver for DirectResolver {
        async fn resolve(&self, url: &str) -> MediaResult<ResolvedVideo> {
            Ok(ResolvedVideo {
                url: url.to_string(),
                resolved: false,
            })
        }
    }

    struct FakeFrameSource {
        dir: PathBuf,
        count: usize,
        invoked: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameSource for FakeFrameSource {
        async fn sample(
            &self,
            _input: &str,
            _segment: &VideoSegment,
            cleanup: &CleanupContext,
        ) -> MediaResult<SampledFrames> {
            self.invoked.store(true, Ordering::SeqCst);
            let mut frames = Vec::new();
            for i in 0..self.count {
                let path = self.dir.join(format!("frame_{:04}.jpg", i + 1));
                let img = image::RgbImage::from_pixel(64, 36, image::Rgb([20, 80, 20]));
                img.save(&path)
                    .map_err(|e| MediaError::ImageDecode(e.to_string()))?;
                cleanup.register(&path);
                frames.push(path);
            }
            Ok(SampledFrames {
                dir: self.dir.clone(),
                frames,
                interval_secs: 2.0,
            })
        }
    }

    struct FixedOcr;

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _png: &[u8]) -> MediaResult<String> {
            Ok("POT: 3,000".to_string())
        }
    }

    struct NoopAnalyzer;

    #[async_trait]
    impl HandAnalyzer for NoopAnalyzer {
        async fn analyze(
            &self,
            _request: &handarc_vision::AnalysisRequest,
        ) -> VisionResult<Vec<handarc_models::CandidateHand>> {
            Err(VisionError::config("not used in this test"))
        }
    }

    struct RecordingBatch {
        submitted: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl BatchSubmitter for RecordingBatch {
        async fn submit(&self, requests: &[BatchRequest]) -> VisionResult<String> {
            self.submitted.lock().unwrap().push(requests.len());
            Ok("batch-42".to_string())
        }
        async fn status(&self, _batch_id: &str) -> VisionResult<BatchState> {
            Ok(BatchState::Pending)
        }
        async fn results(&self, _batch_id: &str) -> VisionResult<Vec<handarc_models::CandidateHand>> {
            Ok(vec![])
        }
    }

    struct NoopRunner;

    #[async_trait]
    impl JobRunner for NoopRunner {
        async fn submit(&self, _s: RunnerSubmission) -> VisionResult<handarc_models::JobId> {
            Err(VisionError::config("not used in this test"))
        }
        async fn run(&self, _id: &handarc_models::JobId) -> VisionResult<RunnerRun> {
            Err(VisionError::config("not used in this test"))
        }
    }

    fn regions() -> RegionMap {
        RegionMap {
            board_area: NormalizedRect::new(0.3, 0.7, 0.4, 0.2),
            seats: vec![SeatRegions {
                seat: 1,
                name_area: NormalizedRect::new(0.05, 0.8, 0.15, 0.05),
                stack_area: NormalizedRect::new(0.05, 0.85, 0.15, 0.05),
            }],
        }
    }

    struct Fixture {
        deps: PipelineDeps,
        batch: Arc<RecordingBatch>,
        frames_invoked: Arc<AtomicBool>,
        _dir: TempDir,
    }

    fn fixture(frame_count: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let batch = Arc::new(RecordingBatch {
            submitted: Mutex::new(Vec::new()),
        });
        let frames_invoked = Arc::new(AtomicBool::new(false));
        let deps = PipelineDeps {
            resolver: Arc::new(DirectResolver),
            frames: Arc::new(FakeFrameSource {
                dir: dir.path().to_path_buf(),
                count: frame_count,
                invoked: frames_invoked.clone(),
            }),
            ocr: Arc::new(FixedOcr),
            analyzer: Arc::new(NoopAnalyzer),
            batch: batch.clone(),
            runner: Arc::new(NoopRunner),
            store: Arc::new(MemoryHandStore::new()),
        };
        Fixture {
            deps,
            batch,
            frames_invoked,
            _dir: dir,
        }
    }

    fn request(segment: VideoSegment) -> ExtractRequest {
        ExtractRequest {
            stream_id: StreamId::from_string("stream-1"),
            url: "https://cdn.example.com/day2.m3u8".to_string(),
            segment,
            regions: regions(),
        }
    }

    #[tokio::test]
    async fn test_extraction_submits_batch_and_reports_it() {
        let fx = fixture(FRAMES_PER_REQUEST + 2);
        let (tx, mut rx) = progress_channel();

        let batch_id =
            run_extraction(fx.deps.clone(), tx, request(VideoSegment::new(0.0, 600.0))).await;
        assert_eq!(batch_id.as_deref(), Some("batch-42"));

        // Frames beyond one window produce a second batch request
        assert_eq!(*fx.batch.submitted.lock().unwrap(), vec![2]);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        match events.first().unwrap() {
            PipelineEvent::Start(data) => {
                assert_eq!(data.segment_id.as_deref(), Some("stream-1"));
                assert!((data.duration - 600.0).abs() < f64::EPSILON);
            }
            other => panic!("expected start, got {:?}", other),
        }
        for event in &events {
            if let PipelineEvent::Progress(data) = event {
                assert_eq!(data.total, 6);
            }
        }

        let terminal = events.into_iter().find(|e| e.is_terminal());
        match terminal {
            Some(PipelineEvent::Complete(data)) => {
                assert_eq!(data.batch_id.as_deref(), Some("batch-42"));
                assert_eq!(data.frame_count, Some((FRAMES_PER_REQUEST + 2) as u32));
                assert!(data.ocr_accuracy.is_some());
            }
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_bound_enforced_before_decode() {
        let fx = fixture(2);
        let (tx, mut rx) = progress_channel();

        let batch_id =
            run_extraction(fx.deps.clone(), tx, request(VideoSegment::new(0.0, 3601.0))).await;
        assert!(batch_id.is_none());
        assert!(!fx.frames_invoked.load(Ordering::SeqCst));

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert_eq!(last.unwrap().event_name(), "error");
    }
}
