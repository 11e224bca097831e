//! Region cropping of sampled frames.
//!
//! Each frame is cropped into the regions named by the layout's region map
//! before OCR. Crops are re-encoded as PNG since tesseract handles it
//! better than recompressed JPEG.

use std::io::Cursor;
use std::path::Path;

use image::{GenericImageView, ImageOutputFormat};

use handarc_models::RegionMap;

use crate::error::{MediaError, MediaResult};

/// One cropped region of a frame, labeled by what it contains.
#[derive(Debug, Clone)]
pub struct RegionCrop {
    /// "board", "seat3_name", "seat3_stack", ...
    pub label: String,
    /// Seat number for seat regions, None for the board.
    pub seat: Option<u8>,
    /// PNG-encoded crop.
    pub png: Vec<u8>,
}

/// Crop one frame into all regions of the map. Synchronous and CPU-bound;
/// callers on the async runtime should wrap it in `spawn_blocking`.
pub fn crop_frame(frame_path: &Path, regions: &RegionMap) -> MediaResult<Vec<RegionCrop>> {
    let img = image::open(frame_path).map_err(|e| MediaError::ImageDecode(e.to_string()))?;
    let (width, height) = img.dimensions();

    let mut crops = Vec::with_capacity(1 + regions.seats.len() * 2);
    crops.push(encode_crop(&img, width, height, "board", None, &regions.board_area)?);

    for seat in &regions.seats {
        crops.push(encode_crop(
            &img,
            width,
            height,
            &format!("seat{}_name", seat.seat),
            Some(seat.seat),
            &seat.name_area,
        )?);
        crops.push(encode_crop(
            &img,
            width,
            height,
            &format!("seat{}_stack", seat.seat),
            Some(seat.seat),
            &seat.stack_area,
        )?);
    }

    Ok(crops)
}

fn encode_crop(
    img: &image::DynamicImage,
    frame_width: u32,
    frame_height: u32,
    label: &str,
    seat: Option<u8>,
    rect: &handarc_models::NormalizedRect,
) -> MediaResult<RegionCrop> {
    let (x, y, w, h) = rect.to_pixels(frame_width, frame_height);
    let crop = img.crop_imm(x, y, w.max(1), h.max(1));

    let mut png = Vec::new();
    crop.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .map_err(|e| MediaError::ImageDecode(e.to_string()))?;

    Ok(RegionCrop {
        label: label.to_string(),
        seat,
        png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use handarc_models::{NormalizedRect, SeatRegions};
    use tempfile::TempDir;

    fn test_map() -> RegionMap {
        RegionMap {
            board_area: NormalizedRect::new(0.3, 0.7, 0.4, 0.2),
            seats: vec![SeatRegions {
                seat: 3,
                name_area: NormalizedRect::new(0.05, 0.8, 0.15, 0.05),
                stack_area: NormalizedRect::new(0.05, 0.85, 0.15, 0.05),
            }],
        }
    }

    #[test]
    fn test_crop_labels_and_count() {
        let dir = TempDir::new().unwrap();
        let frame = dir.path().join("frame_0001.png");
        let img = image::RgbImage::from_pixel(640, 360, image::Rgb([40, 90, 40]));
        img.save(&frame).unwrap();

        let crops = crop_frame(&frame, &test_map()).unwrap();
        assert_eq!(crops.len(), 3);
        assert_eq!(crops[0].label, "board");
        assert_eq!(crops[1].label, "seat3_name");
        assert_eq!(crops[1].seat, Some(3));
        assert!(!crops[2].png.is_empty());
    }

    #[test]
    fn test_missing_frame_fails() {
        let result = crop_frame(Path::new("/nonexistent/frame.jpg"), &test_map());
        assert!(result.is_err());
    }
}
