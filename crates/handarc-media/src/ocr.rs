//! Tesseract OCR over cropped regions, plus poker-specific text parsing.
//!
//! OCR text from broadcast overlays is noisy. The parsers here pull out
//! what downstream actually needs (card codes, chip counts, pot size) and
//! drop the rest. `ocr_accuracy` measures how much of a run's regions
//! produced usable text, reported to clients at the end of extraction.

use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use handarc_models::parse_chip_amount;

use crate::crop::RegionCrop;
use crate::error::{MediaError, MediaResult};

/// Recognizes text in a cropped region image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, png: &[u8]) -> MediaResult<String>;
}

/// OCR engine backed by the tesseract CLI, reading the image from stdin
/// and writing text to stdout so no temp files are needed per region.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    /// Page segmentation mode. 6 (uniform text block) works best on
    /// broadcast overlay crops.
    psm: u8,
    language: String,
    timeout_secs: u64,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            psm: 6,
            language: "eng".to_string(),
            timeout_secs: 30,
        }
    }
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = psm;
        self
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, png: &[u8]) -> MediaResult<String> {
        which::which("tesseract").map_err(|_| MediaError::TesseractNotFound)?;

        let mut child = Command::new("tesseract")
            .args([
                "stdin",
                "stdout",
                "--psm",
                &self.psm.to_string(),
                "-l",
                &self.language,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(png).await?;
        }
        drop(child.stdin.take());

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| MediaError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            return Err(MediaError::OcrFailed {
                message: format!("tesseract exited with {:?}", output.status.code()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// OCR text gathered from one seat's regions in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatReading {
    pub seat: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<i64>,
}

/// OCR text gathered from one whole frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReading {
    pub frame_index: usize,
    /// Raw board-area text, retained for the analyzer prompt.
    pub board_text: String,
    /// Card codes recognized in the board area ("As", "Kh", ...).
    pub cards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pot: Option<i64>,
    pub seats: Vec<SeatReading>,
}

impl FrameReading {
    /// Run OCR over a frame's crops and assemble the structured reading.
    pub async fn from_crops(
        engine: &dyn OcrEngine,
        frame_index: usize,
        crops: &[RegionCrop],
    ) -> MediaResult<Self> {
        let mut reading = FrameReading {
            frame_index,
            ..Default::default()
        };

        for crop in crops {
            let text = engine.recognize(&crop.png).await?;
            match (crop.label.as_str(), crop.seat) {
                ("board", _) => {
                    reading.cards = parse_cards(&text);
                    reading.pot = parse_pot(&text);
                    reading.board_text = text;
                }
                (label, Some(seat)) if label.ends_with("_name") => {
                    reading.seat_mut(seat).name = text;
                }
                (label, Some(seat)) if label.ends_with("_stack") => {
                    reading.seat_mut(seat).stack = parse_chip_text(&text);
                }
                _ => {}
            }
        }

        Ok(reading)
    }

    fn seat_mut(&mut self, seat: u8) -> &mut SeatReading {
        if let Some(pos) = self.seats.iter().position(|s| s.seat == seat) {
            return &mut self.seats[pos];
        }
        self.seats.push(SeatReading {
            seat,
            ..Default::default()
        });
        let last = self.seats.len() - 1;
        &mut self.seats[last]
    }

    /// Number of regions in this reading that produced usable text.
    fn usable_regions(&self) -> (usize, usize) {
        let mut usable = 0;
        let mut total = 1; // board
        if !self.board_text.is_empty() {
            usable += 1;
        }
        for seat in &self.seats {
            total += 2;
            if !seat.name.trim().is_empty() {
                usable += 1;
            }
            if seat.stack.is_some() {
                usable += 1;
            }
        }
        (usable, total)
    }
}

/// Fraction of OCR regions across all frames that yielded usable text,
/// 0.0-1.0.
pub fn ocr_accuracy(readings: &[FrameReading]) -> f64 {
    let (usable, total) = readings.iter().fold((0usize, 0usize), |(u, t), r| {
        let (ru, rt) = r.usable_regions();
        (u + ru, t + rt)
    });
    if total == 0 {
        0.0
    } else {
        usable as f64 / total as f64
    }
}

fn card_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Ranks with both ASCII and unicode suit symbols as broadcasts render them
    RE.get_or_init(|| Regex::new(r"(10|[2-9TJQKA])\s?([shcd♠♥♣♦])").unwrap())
}

/// Extract normalized card codes ("As", "Th") from board-area OCR text.
/// Unicode suit symbols are mapped to letters and "10" to "T".
pub fn parse_cards(text: &str) -> Vec<String> {
    card_regex()
        .captures_iter(text)
        .map(|cap| {
            let rank = match &cap[1] {
                "10" => "T",
                r => r,
            };
            let suit = match &cap[2] {
                "♠" => "s",
                "♥" => "h",
                "♣" => "c",
                "♦" => "d",
                s => s,
            };
            format!("{}{}", rank, suit)
        })
        .collect()
}

/// Extract a chip amount from noisy stack-area text ("Stack: 1.5K").
pub fn parse_chip_text(text: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)([\d][\d,.]*\s?[km]?)").unwrap());
    re.captures(text)
        .and_then(|cap| parse_chip_amount(cap[1].trim()))
}

/// Extract the pot size from board-area text ("POT: 24,000").
fn parse_pot(text: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)pot[:\s]*([\d][\d,.]*\s?[km]?)").unwrap());
    re.captures(text)
        .and_then(|cap| parse_chip_amount(cap[1].trim()))
}
