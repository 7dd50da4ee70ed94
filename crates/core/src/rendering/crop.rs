//! Padded face crops.
use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;

use crate::detection::domain::detection_result::CroppedFace;
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::{Frame, CHANNELS};

/// Padding added on every side, relative to the longer rect side.
pub const CROP_PADDING_RATIO: f64 = 0.25;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to read font {path}: {message}")]
    Font { path: String, message: String },
}

/// Padding in pixels for a rect: `round(0.25 * max(width, height))`.
pub fn crop_padding(rect: &FaceRect) -> u32 {
    (rect.width.max(rect.height) as f64 * CROP_PADDING_RATIO).round() as u32
}

/// The rect grown by [`crop_padding`] on all sides and clamped to the image.
pub fn padded_crop_region(rect: &FaceRect, image_width: u32, image_height: u32) -> FaceRect {
    let pad = crop_padding(rect);
    let x1 = rect.x.saturating_sub(pad).min(image_width);
    let y1 = rect.y.saturating_sub(pad).min(image_height);
    let x2 = rect.right().saturating_add(pad).min(image_width);
    let y2 = rect.bottom().saturating_add(pad).min(image_height);
    FaceRect::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
}

/// Extract and PNG-encode a padded crop for every rect, in input order.
///
/// Rects whose padded region is empty after clamping (entirely outside the
/// image) produce no crop.
pub fn crop_faces(frame: &Frame, rects: &[FaceRect]) -> Result<Vec<CroppedFace>, RenderError> {
    let mut crops = Vec::with_capacity(rects.len());
    for rect in rects {
        let region = padded_crop_region(rect, frame.width(), frame.height());
        if region.is_empty() {
            log::debug!("Skipping crop for {rect:?}: outside {}x{}", frame.width(), frame.height());
            continue;
        }
        debug_assert!(region.fits_within(frame.width(), frame.height()));
        let pixels = copy_region(frame, &region);
        let png = encode_png(&pixels, region.width, region.height)?;
        crops.push(CroppedFace { region, png });
    }
    Ok(crops)
}

/// Encode tightly packed RGB8 pixels as PNG.
pub fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    PngEncoder::new(&mut buf).write_image(rgb, width, height, ExtendedColorType::Rgb8)?;
    Ok(buf.into_inner())
}

/// Row-by-row copy of a region that lies within the frame.
fn copy_region(frame: &Frame, region: &FaceRect) -> Vec<u8> {
    let stride = frame.width() as usize * CHANNELS;
    let row_len = region.width as usize * CHANNELS;
    let x_off = region.x as usize * CHANNELS;
    let data = frame.data();

    let mut out = Vec::with_capacity(row_len * region.height as usize);
    for y in region.y as usize..region.bottom() as usize {
        let start = y * stride + x_off;
        out.extend_from_slice(&data[start..start + row_len]);
    }
    out
}
