use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::result::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Outline thickness in pixels.
const BOX_THICKNESS: i32 = 2;

pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image =
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).context("decode jpeg")?;
    Ok(image.into_rgb8())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(image)
        .context("encode jpeg")?;
    Ok(out)
}

/// Draw one outline per detection. Boxes are clamped to the frame; boxes that
/// collapse to nothing after clamping are skipped.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = image.dimensions();
    for detection in detections {
        let bbox = detection.bounding_box.clamped(width, height);
        for inset in 0..BOX_THICKNESS {
            let x = bbox.x1 as i32 + inset;
            let y = bbox.y1 as i32 + inset;
            let w = bbox.width() as i32 - 2 * inset;
            let h = bbox.height() as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w as u32, h as u32), BOX_COLOR);
        }
    }
}
