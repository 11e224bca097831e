//! Frame sampling from video segments.
//!
//! One FFmpeg invocation samples a whole segment at a fixed interval,
//! downscaled to the broadcast analysis resolution. Output files land in a
//! per-run directory registered with the cleanup context before the process
//! is spawned, so even a killed run gets swept.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use handarc_models::VideoSegment;

use crate::cleanup::CleanupContext;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Default sampling interval. One frame every two seconds is enough to
/// catch every street of a televised hand.
pub const DEFAULT_INTERVAL_SECS: f64 = 2.0;

/// Analysis resolution. Broadcast overlays are legible at 720p and OCR
/// gains nothing above it.
pub const FRAME_WIDTH: u32 = 1280;
pub const FRAME_HEIGHT: u32 = 720;

/// Frames sampled from one segment, in chronological order.
#[derive(Debug, Clone)]
pub struct SampledFrames {
    /// Directory holding the frame files.
    pub dir: PathBuf,
    /// Frame paths sorted by sample time.
    pub frames: Vec<PathBuf>,
    /// Seconds between consecutive frames.
    pub interval_secs: f64,
}

impl SampledFrames {
    /// Source-video offset of the given frame, in seconds.
    pub fn frame_offset(&self, segment: &VideoSegment, index: usize) -> f64 {
        segment.start + index as f64 * self.interval_secs
    }
}

/// Samples frames from a segment of a playable input.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn sample(
        &self,
        input: &str,
        segment: &VideoSegment,
        cleanup: &CleanupContext,
    ) -> MediaResult<SampledFrames>;
}

/// FFmpeg-backed frame source.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    base_dir: PathBuf,
    interval_secs: f64,
    timeout_secs: u64,
}

impl FfmpegFrameSource {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            timeout_secs: 300,
        }
    }

    pub fn with_interval(mut self, secs: f64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn sample(
        &self,
        input: &str,
        segment: &VideoSegment,
        cleanup: &CleanupContext,
    ) -> MediaResult<SampledFrames> {
        // Live streams report no duration; only reject what is provably
        // out of range
        let info = probe_video(input).await?;
        if info.duration > 0.0 && segment.start >= info.duration {
            return Err(MediaError::InvalidVideo(format!(
                "segment starts at {:.0}s but the video is {:.0}s long",
                segment.start, info.duration
            )));
        }

        let run_dir = self.base_dir.join(format!("frames-{}", Uuid::new_v4()));
        // Register before spawn so a killed run still gets swept
        cleanup.register(&run_dir);
        fs::create_dir_all(&run_dir).await?;

        let pattern = run_dir.join("frame_%04d.jpg");
        let cmd = FfmpegCommand::new(input, &pattern)
            .seek(segment.start)
            .duration(segment.duration_secs())
            .video_filter(format!(
                "fps=1/{},scale={}:{}",
                self.interval_secs, FRAME_WIDTH, FRAME_HEIGHT
            ))
            .jpeg_quality(2)
            .no_audio();

        FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .run(&cmd)
            .await?;

        let mut frames = Vec::new();
        let mut entries = fs::read_dir(&run_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "jpg") {
                cleanup.register(&path);
                frames.push(path);
            }
        }
        // frame_%04d names sort chronologically
        frames.sort();

        if frames.is_empty() {
            return Err(MediaError::NoFramesExtracted);
        }

        info!(
            "Sampled {} frames from {:.0}s segment into {}",
            frames.len(),
            segment.duration_secs(),
            run_dir.display()
        );

        Ok(SampledFrames {
            dir: run_dir,
            frames,
            interval_secs: self.interval_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_offsets() {
        let sampled = SampledFrames {
            dir: PathBuf::from("/tmp/frames"),
            frames: vec![],
            interval_secs: 2.0,
        };
        let segment = VideoSegment::new(60.0, 180.0);
        assert!((sampled.frame_offset(&segment, 0) - 60.0).abs() < f64::EPSILON);
        assert!((sampled.frame_offset(&segment, 5) - 70.0).abs() < f64::EPSILON);
    }
}
