//! FFmpeg/tesseract CLI wrappers for the extraction pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout and kill-on-timeout
//! - Stream URL resolution via yt-dlp
//! - Frame sampling from video segments
//! - Region cropping of sampled frames
//! - Tesseract OCR over cropped regions, with poker-specific text parsing
//! - Temp file tracking so every run cleans up after itself

pub mod cleanup;
pub mod command;
pub mod crop;
pub mod error;
pub mod frames;
pub mod ocr;
pub mod probe;
pub mod resolve;

pub use cleanup::{cleanup_old_temp_files, CleanupContext};
pub use command::{check_ffmpeg, check_ffprobe, check_tesseract, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use crop::{crop_frame, RegionCrop};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegFrameSource, FrameSource, SampledFrames};
pub use ocr::{
    ocr_accuracy, parse_cards, parse_chip_text, FrameReading, OcrEngine, SeatReading, TesseractOcr,
};
pub use probe::{probe_video, VideoInfo};
pub use resolve::{ResolvedVideo, VideoResolver, YtDlpResolver};
