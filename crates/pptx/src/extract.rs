//! Slide region extraction and the placeholder canvas.

use crate::parser::PptxDocument;
use image::{ImageFormat, Rgb, RgbImage};
use linker_core::{emu_to_px, Error, Region, Result, SlideCanvas};
use std::io::Cursor;

/// Flat fill of the placeholder canvas.
pub const CANVAS_FILL: [u8; 3] = [240, 240, 240];

/// Extract the mappable regions of one slide along with a flat canvas sized
/// to the presentation.
///
/// `slide_number` is 1-based. Anything outside `1..=slide_count` is treated
/// as slide 1.
pub fn extract_regions(document: &PptxDocument, slide_number: i64) -> Result<SlideCanvas> {
    let count = document.slide_count();
    if count == 0 {
        return Err(Error::NoSlides);
    }

    let number = clamp_slide_number(slide_number, count);
    if number as i64 != slide_number {
        log::debug!("Slide {} out of range, using slide 1", slide_number);
    }

    let (width_emu, height_emu) = document.slide_size_emu();
    let width_px = canvas_dimension(width_emu);
    let height_px = canvas_dimension(height_emu);
    let png = render_placeholder(width_px, height_px)?;

    let regions: Vec<Region> = document
        .shapes(number)?
        .iter()
        .filter(|shape| shape.kind.is_region())
        .map(|shape| shape.region(number))
        .collect();

    log::debug!(
        "Slide {}: {} regions on a {}x{} canvas",
        number,
        regions.len(),
        width_px,
        height_px
    );

    Ok(SlideCanvas {
        slide_number: number,
        width_px,
        height_px,
        png,
        regions,
    })
}

/// Map a requested slide number onto an existing one.
pub fn clamp_slide_number(requested: i64, slide_count: usize) -> usize {
    match usize::try_from(requested) {
        Ok(n) if (1..=slide_count).contains(&n) => n,
        _ => 1,
    }
}

/// Largest slide side PowerPoint allows (51206400 EMU), in pixels.
pub const MAX_CANVAS_SIDE: u32 = 5376;

/// Canvas side in pixels; never zero so the PNG stays encodable.
fn canvas_dimension(emu: i64) -> u32 {
    u32::try_from(emu_to_px(emu).max(1)).unwrap_or(u32::MAX)
}

/// Encode a flat canvas of the given size as PNG.
///
/// Sides beyond [`MAX_CANVAS_SIDE`] come from a malformed slide size and are
/// rejected.
pub fn render_placeholder(width_px: u32, height_px: u32) -> Result<Vec<u8>> {
    if width_px > MAX_CANVAS_SIDE || height_px > MAX_CANVAS_SIDE {
        return Err(Error::CanvasError(format!(
            "Slide size {}x{} px exceeds the {} px limit",
            width_px, height_px, MAX_CANVAS_SIDE
        )));
    }
    let canvas = RgbImage::from_pixel(width_px, height_px, Rgb(CANVAS_FILL));
    let mut buf = Cursor::new(Vec::new());
    canvas
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| Error::CanvasError(e.to_string()))?;
    Ok(buf.into_inner())
}
