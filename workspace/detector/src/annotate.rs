//! Rendering of detection boxes and atomic output of annotated images.

use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::{BoundingBox, DetectorError};

/// JPEG quality for annotated images (85% keeps boxes crisp while
/// controlling file size).
const JPEG_QUALITY: u8 = 85;

/// Box outline color.
const BOX_COLOR: Rgb<u8> = Rgb([255, 40, 40]);

/// Outline thickness in pixels.
const BOX_THICKNESS: u32 = 3;

/// Decode raw image bytes, mapping any codec failure to [`DetectorError::Decode`].
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DetectorError> {
    if bytes.is_empty() {
        return Err(DetectorError::Decode("image data is empty".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| DetectorError::Decode(e.to_string()))
}

/// Draw the detection boxes onto a copy of the image.
pub fn draw_boxes(image: &DynamicImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for b in boxes {
        if b.width == 0 || b.height == 0 {
            continue;
        }
        for inset in 0..BOX_THICKNESS {
            let w = b.width.saturating_sub(inset * 2);
            let h = b.height.saturating_sub(inset * 2);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((b.x + inset) as i32, (b.y + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }
    }
    canvas
}

/// Encode the annotated image as JPEG and move it into place atomically.
///
/// The image is written next to the target under a `.tmp` suffix and then
/// renamed, so readers of the final path never observe a half-written file.
pub async fn write_annotated(image: &RgbImage, path: &Path) -> Result<(), DetectorError> {
    let mut buffer = Vec::new();
    {
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        image
            .write_with_encoder(encoder)
            .map_err(|e| DetectorError::Decode(e.to_string()))?;
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &buffer).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
