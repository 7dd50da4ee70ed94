//! Detection overlays: translucent box, solid border and a `#n` label per face.
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::buffer::ConvertBuffer;
use image::{Pixel, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size, Blend,
};
use imageproc::rect::Rect;

use crate::rendering::crop::RenderError;
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

const FILL_ALPHA: f32 = 0.2;
const MIN_STROKE: u32 = 2;
const STROKE_DIVISOR: u32 = 300;
const MIN_LABEL_SCALE: f32 = 14.0;
const LABEL_SCALE_DIVISOR: f32 = 40.0;
const LABEL_PADDING: u32 = 4;
/// Average glyph advance relative to the font size, for sizing label
/// backgrounds when no font is loaded.
const FALLBACK_ADVANCE: f32 = 0.6;
const LABEL_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

impl From<FaceRect> for Rect {
    fn from(rect: FaceRect) -> Self {
        Rect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height)
    }
}

/// Border thickness for an image of the given width.
pub fn stroke_width(image_width: u32) -> u32 {
    (image_width / STROKE_DIVISOR).max(MIN_STROKE)
}

/// Label font size in pixels for an image of the given width.
pub fn label_scale(image_width: u32) -> f32 {
    (image_width as f32 / LABEL_SCALE_DIVISOR).max(MIN_LABEL_SCALE)
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontArc, RenderError> {
    let font_error = |message: String| RenderError::Font {
        path: path.display().to_string(),
        message,
    };
    let bytes = std::fs::read(path).map_err(|e| font_error(e.to_string()))?;
    FontArc::try_from_vec(bytes).map_err(|e| font_error(e.to_string()))
}

/// Copy the frame and draw every rect onto the copy.
///
/// Labels are numbered from 1 in `rects` order, matching crop file names.
/// Without a font only the label backgrounds are drawn.
pub fn draw_detections(
    frame: &Frame,
    rects: &[FaceRect],
    color: Rgb<u8>,
    font: Option<&FontArc>,
) -> RgbImage {
    // RGBA so the fill can alpha-blend; every other color is opaque.
    let mut canvas: Blend<RgbaImage> = Blend(frame.as_image().convert());
    let (width, height) = canvas.0.dimensions();
    let stroke = stroke_width(width);
    let scale = label_scale(width);
    let solid = color.to_rgba();
    let mut fill = solid;
    fill.0[3] = (FILL_ALPHA * 255.0).round() as u8;

    for (i, rect) in rects.iter().enumerate() {
        let rect = rect.clamp_to(width, height);
        if rect.is_empty() {
            continue;
        }
        draw_filled_rect_mut(&mut canvas, rect.into(), fill);
        draw_border(&mut canvas, &rect, solid, stroke);
        draw_label(&mut canvas, &rect, &format!("#{}", i + 1), solid, font, scale);
    }
    canvas.0.convert()
}

/// Draws the border as `stroke` nested one-pixel outlines, inward.
fn draw_border(canvas: &mut Blend<RgbaImage>, rect: &FaceRect, color: Rgba<u8>, stroke: u32) {
    for k in 0..stroke {
        if rect.width <= 2 * k || rect.height <= 2 * k {
            break;
        }
        let inset = FaceRect::new(rect.x + k, rect.y + k, rect.width - 2 * k, rect.height - 2 * k);
        draw_hollow_rect_mut(canvas, inset.into(), color);
    }
}

/// Label above the rect when there is room, otherwise inside its top edge.
fn draw_label(
    canvas: &mut Blend<RgbaImage>,
    rect: &FaceRect,
    text: &str,
    color: Rgba<u8>,
    font: Option<&FontArc>,
    scale: f32,
) {
    let (text_w, text_h) = match font {
        Some(font) => text_size(PxScale::from(scale), font, text),
        None => (
            (scale * FALLBACK_ADVANCE * text.chars().count() as f32).ceil() as u32,
            scale.ceil() as u32,
        ),
    };
    let box_w = text_w + 2 * LABEL_PADDING;
    let box_h = text_h + 2 * LABEL_PADDING;
    let box_y = if rect.y >= box_h { rect.y - box_h } else { rect.y };

    draw_filled_rect_mut(
        canvas,
        Rect::at(rect.x as i32, box_y as i32).of_size(box_w, box_h),
        color,
    );
    if let Some(font) = font {
        draw_text_mut(
            canvas,
            LABEL_TEXT,
            (rect.x + LABEL_PADDING) as i32,
            (box_y + LABEL_PADDING) as i32,
            PxScale::from(scale),
            font,
            text,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const COLOR: Rgb<u8> = Rgb([100, 200, 50]);

    /// Alpha blending may truncate rather than round.
    fn assert_blended(px: &Rgb<u8>, expected: [u8; 3]) {
        for (got, want) in px.0.iter().zip(expected) {
            assert!(got.abs_diff(want) <= 1, "{:?} vs {expected:?}", px.0);
        }
    }

    fn black(width: u32, height: u32) -> Frame {
        Frame::from_rgb_image(RgbImage::new(width, height))
    }

    #[rstest]
    #[case(100, 2)]
    #[case(600, 2)]
    #[case(900, 3)]
    #[case(3000, 10)]
    fn test_stroke_scales_with_width(#[case] width: u32, #[case] expected: u32) {
        assert_eq!(stroke_width(width), expected);
    }

    #[test]
    fn test_label_scale_has_floor() {
        assert_eq!(label_scale(100), 14.0);
        assert_eq!(label_scale(1600), 40.0);
    }

    #[test]
    fn test_no_rects_is_plain_copy() {
        let frame = Frame::from_rgb_image(RgbImage::from_pixel(8, 8, Rgb([9, 8, 7])));
        let out = draw_detections(&frame, &[], COLOR, None);
        assert_eq!(out.as_raw().as_slice(), frame.data());
    }

    #[test]
    fn test_fill_border_and_label() {
        let frame = black(100, 100);
        let out = draw_detections(&frame, &[FaceRect::new(20, 20, 40, 40)], COLOR, None);

        // Translucent interior, clear of the label.
        assert_blended(out.get_pixel(50, 55), [20, 40, 10]);
        // Solid border on both stroke rings.
        assert_eq!(*out.get_pixel(59, 40), COLOR);
        assert_eq!(*out.get_pixel(58, 40), COLOR);
        assert_blended(out.get_pixel(57, 40), [20, 40, 10]);
        // No room above: label sits inside the top-left corner.
        assert_eq!(*out.get_pixel(24, 30), COLOR);
        // Outside untouched.
        assert_eq!(out.get_pixel(80, 80).0, [0, 0, 0]);
        // Source frame is not modified.
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_label_above_when_room() {
        let out = draw_detections(&black(100, 100), &[FaceRect::new(30, 60, 20, 20)], COLOR, None);
        // 14px label + padding = 22px tall, so it spans y 38..60.
        assert_eq!(*out.get_pixel(31, 40), COLOR);
        assert_eq!(out.get_pixel(31, 36).0, [0, 0, 0]);
    }

    #[test]
    fn test_rects_outside_image_are_ignored() {
        let frame = black(20, 20);
        let out = draw_detections(
            &frame,
            &[FaceRect::new(50, 50, 10, 10), FaceRect::new(15, 15, 30, 30)],
            COLOR,
            None,
        );
        // Second rect is clipped to 5x5 and still drawn.
        assert_eq!(*out.get_pixel(19, 19), COLOR);
    }

    #[test]
    fn test_tiny_rect_does_not_panic() {
        let out = draw_detections(&black(10, 10), &[FaceRect::new(3, 3, 1, 1)], COLOR, None);
        assert_eq!(*out.get_pixel(3, 3), COLOR);
    }

    #[test]
    fn test_load_font_missing_file() {
        let err = load_font(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, RenderError::Font { .. }));
    }

    #[test]
    fn test_load_font_rejects_garbage() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a font").unwrap();
        assert!(load_font(tmp.path()).is_err());
    }

    #[test]
    fn test_fill_blends_over_bright_pixels() {
        let frame = Frame::from_rgb_image(RgbImage::from_pixel(60, 60, Rgb([200, 200, 200])));
        let out = draw_detections(&frame, &[FaceRect::new(10, 30, 40, 20)], COLOR, None);
        // 0.8 * 200 + 0.2 * (100, 200, 50)
        assert_blended(out.get_pixel(30, 42), [180, 200, 170]);
    }
}
