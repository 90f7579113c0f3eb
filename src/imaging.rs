use crate::overlay::{Overlay, OverlayBox};
use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use std::sync::OnceLock;
use thiserror::Error;

const LABEL_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const LABEL_SCALE: f32 = 12.0;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(image::ImageError),
    #[error("Cannot encode an empty frame")]
    EmptyFrame,
}

/// JPEG-encodes a frame. `quality` is clamped to 1..=100.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, ImagingError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(ImagingError::EmptyFrame);
    }

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    frame
        .write_with_encoder(encoder)
        .map_err(ImagingError::EncodeFrameFailed)?;
    Ok(buf)
}

fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!("Label font unusable, drawing boxes without captions: {}", e);
            None
        }
    })
    .as_ref()
}

/// Paints the overlay onto the frame: a 2 px box per detection and its label,
/// both in the box colour.
pub fn annotate(frame: &mut RgbImage, overlay: &Overlay) {
    for overlay_box in &overlay.boxes {
        paint_box(frame, overlay_box);
    }
}

fn paint_box(frame: &mut RgbImage, overlay_box: &OverlayBox) {
    let color = Rgb(overlay_box.color);
    let x = overlay_box.x.round() as i32;
    let y = overlay_box.y.round() as i32;
    let width = overlay_box.width.round().max(1.0) as u32;
    let height = overlay_box.height.round().max(1.0) as u32;

    // The stroke straddles the edge: one pixel outside, one inside.
    let outer = Rect::at(x - 1, y - 1).of_size(width + 2, height + 2);
    draw_hollow_rect_mut(frame, outer, color);
    draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(width, height), color);

    let Some(font) = label_font() else {
        return;
    };
    let scale = PxScale::from(LABEL_SCALE);
    // `label_y` is the text baseline; imageproc positions text by its top.
    let ascent = font.as_scaled(scale).ascent();
    let top = (overlay_box.label_y - ascent).round() as i32;
    draw_text_mut(
        frame,
        color,
        overlay_box.label_x.round() as i32,
        top,
        scale,
        font,
        &overlay_box.label,
    );
}
