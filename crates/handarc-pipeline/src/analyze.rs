//! Synchronous analysis of a short segment.
//!
//! The caller holds an SSE connection open for the whole run, so the
//! segment is bounded to [`MAX_SYNC_SEGMENT_SECS`] and the bound is
//! enforced before any decode work starts. Longer segments go through
//! [`crate::extract`] instead.

use std::time::Instant;

use tracing::{error, info};

use handarc_db::{HandSaver, SaveOutcome};
use handarc_media::{cleanup::CleanupContext, crop_frame, FrameReading};
use handarc_models::{
    CompleteData, RegionMap, StreamId, StreamStatus, VideoSegment, MAX_SYNC_SEGMENT_SECS,
};
use handarc_vision::{AnalysisRequest, FramePayload};

use crate::deps::PipelineDeps;
use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressSender;
use crate::retry::{with_retry, RetryConfig};

/// Steps reported by the synchronous run.
const TOTAL_STEPS: u32 = 5;

/// A synchronous analysis request.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub stream_id: StreamId,
    /// Stream URL, resolved via yt-dlp when it is a platform URL.
    pub url: String,
    pub segment: VideoSegment,
    /// Broadcast layout regions for OCR.
    pub regions: RegionMap,
}

/// Run the synchronous pipeline, reporting progress on `progress` until a
/// terminal event. The stream's status row tracks the outcome.
pub async fn run_analysis(deps: PipelineDeps, progress: ProgressSender, request: AnalyzeRequest) {
    let cleanup = CleanupContext::new();
    let started = Instant::now();

    let result = run_steps(&deps, &progress, &request, &cleanup, started).await;
    cleanup.cleanup().await;

    match result {
        Ok(data) => {
            progress.complete(data);
            if let Err(e) = deps
                .store
                .update_stream_status(&request.stream_id, StreamStatus::Completed)
                .await
            {
                error!("Failed to mark stream {} completed: {}", request.stream_id, e);
            }
        }
        Err(e) => {
            error!("Analysis of stream {} failed: {}", request.stream_id, e);
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
        }
    }
}

async fn run_steps(
    deps: &PipelineDeps,
    progress: &ProgressSender,
    request: &AnalyzeRequest,
    cleanup: &CleanupContext,
    started: Instant,
) -> PipelineResult<CompleteData> {
    let duration = request.segment.duration_secs();
    progress.start(
        Some(request.stream_id.to_string()),
        duration,
        estimated_run_time(duration),
    );

    // Bounds are checked before any decode or network work
    request.segment.validate(MAX_SYNC_SEGMENT_SECS)?;
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

    // Step 3: crop regions and OCR them
    progress.progress(3, TOTAL_STEPS, "Reading broadcast overlays");
    let readings = with_retry(
        &RetryConfig::ocr(),
        "ocr",
        retry_reporter(progress, 3, TOTAL_STEPS),
        || async {
            let mut readings = Vec::with_capacity(sampled.frames.len());
            for (index, frame) in sampled.frames.iter().enumerate() {
                let frame = frame.clone();
                let regions = request.regions.clone();
                let crops =
                    tokio::task::spawn_blocking(move || crop_frame(&frame, &regions)).await??;
                readings.push(FrameReading::from_crops(deps.ocr.as_ref(), index, &crops).await?);
            }
            Ok(readings)
        },
    )
    .await?;
    progress.step_complete(3, "Overlays read");

    // Step 4: vision analysis
    progress.progress(4, TOTAL_STEPS, "Detecting hands");
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
    let analysis = AnalysisRequest { frames, readings };
    let candidates = with_retry(
        &RetryConfig::vision(),
        "analyze",
        retry_reporter(progress, 4, TOTAL_STEPS),
        || async { Ok(deps.analyzer.analyze(&analysis).await?) },
    )
    .await?;
    progress.step_complete(4, format!("{} candidate hands detected", candidates.len()));

    // Step 5: persist
    progress.progress(5, TOTAL_STEPS, "Archiving hands");
    let saver = HandSaver::new(deps.store.clone());
    let report = saver.persist_batch(&request.stream_id, &candidates).await;
    for outcome in &report.saved {
        if let SaveOutcome::Saved {
            hand_id,
            hand_number,
            confidence,
        } = outcome
        {
            progress.hand(*hand_id, hand_number.clone(), *confidence);
        }
    }
    progress.step_complete(5, format!("{} hands archived", report.saved_count()));

    info!(
        "Analysis of stream {} finished: {}/{} hands archived",
        request.stream_id,
        report.saved_count(),
        report.total
    );

    Ok(CompleteData {
        total_hands: report.total,
        saved_hands: report.saved_count(),
        success_rate: report.success_rate(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        average_confidence: average_confidence(&report.saved),
        batch_id: None,
        frame_count: None,
        ocr_accuracy: None,
    })
}

fn average_confidence(saved: &[SaveOutcome]) -> Option<f64> {
    let confidences: Vec<f64> = saved
        .iter()
        .filter_map(|o| match o {
            SaveOutcome::Saved { confidence, .. } => *confidence,
            SaveOutcome::SkippedDuplicate => None,
        })
        .collect();
    if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    }
}

/// Progress callback for retry loops: reports the retry to the subscriber
/// and aborts further retries once the subscriber is gone.
pub(crate) fn retry_reporter<'a>(
    progress: &'a ProgressSender,
    step: u32,
    total: u32,
) -> impl FnMut(u32, &PipelineError) -> bool + 'a {
    move |attempt, err| {
        progress.progress(
            step,
            total,
            format!("Attempt {} failed ({}), retrying", attempt, err),
        );
        !progress.is_closed()
    }
}

/// Wall-clock estimate shown in the start event. Vision calls dominate and
/// scale with the sampled frame count, so scale with segment length.
pub(crate) fn estimated_run_time(duration_secs: f64) -> String {
    let estimate = (duration_secs / 2.0).clamp(30.0, 600.0);
    format!("{:.0} seconds", estimate)
}
