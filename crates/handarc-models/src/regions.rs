//! OCR region layouts.
//!
//! A region map describes where on a broadcast layout the board and each
//! seat's name/stack overlays live. Regions are normalized (0.0-1.0) so one
//! layout works across output resolutions. Malformed maps are rejected
//! before any frame work begins.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegionError {
    #[error("invalid OCR regions: {0}")]
    InvalidRegions(String),
}

/// A normalized rectangle (0.0 to 1.0) representing a relative region of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRect {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the rectangle (0.0 to 1.0)
    pub width: f64,
    /// Height of the rectangle (0.0 to 1.0)
    pub height: f64,
}

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check if the rectangle is within the 0.0-1.0 range.
    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.001 // epsilon for float precision
            && self.y + self.height <= 1.001
    }

    /// Convert to pixel coordinates for a frame of the given dimensions,
    /// clamped to the frame bounds.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x * frame_width as f64) as u32;
        let y = (self.y * frame_height as f64) as u32;
        let w = ((self.width * frame_width as f64) as u32).min(frame_width.saturating_sub(x));
        let h = ((self.height * frame_height as f64) as u32).min(frame_height.saturating_sub(y));
        (x, y, w, h)
    }
}

/// Name and stack overlay regions for one seat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeatRegions {
    /// Seat number (1-based, broadcast layout order).
    pub seat: u8,
    /// Player name overlay.
    pub name_area: NormalizedRect,
    /// Stack size overlay.
    pub stack_area: NormalizedRect,
}

/// Named rectangles for one broadcast layout: the board/pot area plus
/// per-seat name/stack areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegionMap {
    /// Community cards and pot overlay.
    pub board_area: NormalizedRect,
    /// One entry per visible seat.
    pub seats: Vec<SeatRegions>,
}

impl RegionMap {
    /// Validate that the map is well-formed. Called once before any frame
    /// is cropped; a malformed map fails the whole run.
    pub fn validate(&self) -> Result<(), RegionError> {
        if !self.board_area.is_valid() {
            return Err(RegionError::InvalidRegions(
                "board area out of range".to_string(),
            ));
        }
        if self.seats.is_empty() {
            return Err(RegionError::InvalidRegions(
                "at least one seat region is required".to_string(),
            ));
        }
        for seat in &self.seats {
            if seat.seat == 0 {
                return Err(RegionError::InvalidRegions(format!(
                    "seat numbers are 1-based, got {}",
                    seat.seat
                )));
            }
            if !seat.name_area.is_valid() || !seat.stack_area.is_valid() {
                return Err(RegionError::InvalidRegions(format!(
                    "seat {} regions out of range",
                    seat.seat
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_map() -> RegionMap {
        RegionMap {
            board_area: NormalizedRect::new(0.3, 0.7, 0.4, 0.2),
            seats: vec![SeatRegions {
                seat: 1,
                name_area: NormalizedRect::new(0.05, 0.8, 0.15, 0.05),
                stack_area: NormalizedRect::new(0.05, 0.85, 0.15, 0.05),
            }],
        }
    }

    #[test]
    fn test_valid_map_accepted() {
        assert!(valid_map().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_rect_rejected() {
        let mut map = valid_map();
        map.board_area = NormalizedRect::new(0.8, 0.8, 0.5, 0.1);
        assert!(matches!(
            map.validate(),
            Err(RegionError::InvalidRegions(_))
        ));
    }

    #[test]
    fn test_empty_seats_rejected() {
        let mut map = valid_map();
        map.seats.clear();
        assert!(map.validate().is_err());
    }

    #[test]
    fn test_zero_seat_number_rejected() {
        let mut map = valid_map();
        map.seats[0].seat = 0;
        assert!(map.validate().is_err());
    }

    #[test]
    fn test_to_pixels_clamps() {
        let rect = NormalizedRect::new(0.5, 0.5, 0.5, 0.5);
        let (x, y, w, h) = rect.to_pixels(1280, 720);
        assert_eq!((x, y), (640, 360));
        assert!(x + w <= 1280);
        assert!(y + h <= 720);
    }
}
