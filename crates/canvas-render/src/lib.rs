//! SpeedyNote Canvas Render Library
//!
//! Owns the off-screen raster buffer, the widget/buffer/canvas coordinate
//! transform, backdrop production (procedural paper, image, PDF), and
//! stroke rasterization.

pub mod background;
pub mod buffer;
pub mod compose;
pub mod pdf;
pub mod stroke;

pub use background::{Backdrop, BackgroundDescriptor, BackgroundError, BackgroundStyle};
pub use buffer::{Buffer, Pan, Transform, TransformError};
pub use compose::{compose_frame, ObjectLayer, SelectionOverlay};
pub use pdf::{
    LinkArea, LinkTarget, PageDimensions, PdfError, PdfProvider, PdfResult, PdfiumProvider, RenderHints,
    TextBox,
};
pub use stroke::{StrokeEngine, StrokeSample, Tool, ToolThicknesses};

/// A straight RGBA8 (non-premultiplied) raster, the unit of storage for
/// pages, tiles, selections, and rendered backdrops.
#[derive(Debug, Clone)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` bytes, row-major, RGBA8.
    pub pixels: Vec<u8>,
}

impl Pixmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![0u8; (width as usize) * (height as usize) * 4] }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width as usize) * (height as usize) * 4);
        Self { width, height, pixels }
    }

    #[inline]
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let off = self.pixel_offset(x, y);
        [self.pixels[off], self.pixels[off + 1], self.pixels[off + 2], self.pixels[off + 3]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let off = self.pixel_offset(x, y);
        self.pixels[off..off + 4].copy_from_slice(&rgba);
    }

    /// Whether any pixel in this pixmap has nonzero alpha.
    pub fn has_any_opaque_pixel(&self) -> bool {
        self.pixels.chunks_exact(4).any(|rgba| rgba[3] != 0)
    }

    /// source-over composite `other` onto `self` at the given offset.
    pub fn composite_source_over(&mut self, other: &Pixmap, dst_x: i64, dst_y: i64) {
        for sy in 0..other.height {
            let dy = dst_y + sy as i64;
            if dy < 0 || dy as u32 >= self.height {
                continue;
            }
            for sx in 0..other.width {
                let dx = dst_x + sx as i64;
                if dx < 0 || dx as u32 >= self.width {
                    continue;
                }
                let src = other.get_pixel(sx, sy);
                if src[3] == 0 {
                    continue;
                }
                let dst = self.get_pixel(dx as u32, dy as u32);
                self.set_pixel(dx as u32, dy as u32, source_over(src, dst));
            }
        }
    }
}

/// Standard alpha-compositing source-over for straight (non-premultiplied) RGBA8.
pub fn source_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src[c] as f32 / 255.0;
        let d = dst[c] as f32 / 255.0;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        out[c] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out[3] = (out_a.clamp(0.0, 1.0) * 255.0).round() as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_over_opaque_src_replaces_dst() {
        let out = source_over([255, 0, 0, 255], [0, 255, 0, 255]);
        assert_eq!(out, [255, 0, 0, 255]);
    }

    #[test]
    fn source_over_transparent_src_keeps_dst() {
        let out = source_over([255, 0, 0, 0], [0, 255, 0, 255]);
        assert_eq!(out, [0, 255, 0, 255]);
    }

    #[test]
    fn composite_source_over_clips_to_destination_bounds() {
        let mut dst = Pixmap::new(4, 4);
        let mut src = Pixmap::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                src.set_pixel(x, y, [10, 20, 30, 255]);
            }
        }
        dst.composite_source_over(&src, 2, 2);
        assert_eq!(dst.get_pixel(3, 3), [10, 20, 30, 255]);
        assert_eq!(dst.get_pixel(0, 0), [0, 0, 0, 0]);
    }
}
