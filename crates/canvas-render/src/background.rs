//! Backdrop production: procedural paper, a per-page image background, or a
//! PDF page render. See spec.md §4.B.
//!
//! The PDF case does not render here directly — a PDF backdrop is always a
//! *combined* image (page N stacked on N+1, spec.md Invariant 5) produced
//! by the Page Cache, which this crate does not depend on to avoid a
//! dependency cycle (the cache crate depends on this crate for `Pixmap`).
//! Callers hand the already-rendered combined image to [`Backdrop::Pdf`].

use crate::Pixmap;

#[derive(Debug, thiserror::Error)]
pub enum BackgroundError {
    #[error("failed to read background image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode background image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Procedural paper style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BackgroundStyle {
    None,
    Lines,
    Grid,
}

/// RGBA color, 0-255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Default for Rgba {
    fn default() -> Self {
        Rgba(255, 255, 255, 255)
    }
}

/// Document-level background configuration (spec.md §3 Document attributes).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackgroundDescriptor {
    pub style: BackgroundStyle,
    pub color: Rgba,
    pub spacing: u32,
}

impl Default for BackgroundDescriptor {
    fn default() -> Self {
        Self { style: BackgroundStyle::None, color: Rgba::default(), spacing: 40 }
    }
}

/// The non-stroke content of a page: rendered under strokes, never merged
/// into the stroke buffer (spec.md Glossary: Backdrop).
pub enum Backdrop {
    Procedural(BackgroundDescriptor),
    Image(Pixmap),
    /// Already-combined PDF render (page N stacked atop N+1, or white if N
    /// is the last page), as produced by the Page Cache.
    Pdf(Pixmap),
}

/// Fill a buffer-sized pixmap with the procedural paper described by
/// `descriptor`: a solid fill, plus horizontal lines (Lines) or horizontal
/// + vertical lines (Grid) every `spacing` pixels.
pub fn render_procedural(descriptor: &BackgroundDescriptor, width: u32, height: u32) -> Pixmap {
    let mut pixmap = Pixmap::new(width, height);
    let fill = [descriptor.color.0, descriptor.color.1, descriptor.color.2, descriptor.color.3];
    for px in pixmap.pixels.chunks_exact_mut(4) {
        px.copy_from_slice(&fill);
    }

    if descriptor.spacing == 0 {
        return pixmap;
    }

    let line_rgba = [
        descriptor.color.0.saturating_sub(40).max(160).min(200),
        descriptor.color.1.saturating_sub(40).max(160).min(200),
        descriptor.color.2.saturating_sub(40).max(160).min(200),
        255,
    ];

    match descriptor.style {
        BackgroundStyle::None => {}
        BackgroundStyle::Lines => {
            draw_horizontal_lines(&mut pixmap, descriptor.spacing, line_rgba);
        }
        BackgroundStyle::Grid => {
            draw_horizontal_lines(&mut pixmap, descriptor.spacing, line_rgba);
            draw_vertical_lines(&mut pixmap, descriptor.spacing, line_rgba);
        }
    }

    pixmap
}

fn draw_horizontal_lines(pixmap: &mut Pixmap, spacing: u32, rgba: [u8; 4]) {
    let mut y = spacing;
    while y < pixmap.height {
        for x in 0..pixmap.width {
            pixmap.set_pixel(x, y, rgba);
        }
        y += spacing;
    }
}

fn draw_vertical_lines(pixmap: &mut Pixmap, spacing: u32, rgba: [u8; 4]) {
    let mut x = spacing;
    while x < pixmap.width {
        for y in 0..pixmap.height {
            pixmap.set_pixel(x, y, rgba);
        }
        x += spacing;
    }
}

/// Load a per-page background image (`bg_{docId}_{N:05}.png`) from the
/// bundle. Returns `Ok(None)` if the file does not exist.
pub fn load_image_backdrop(path: &std::path::Path) -> Result<Option<Pixmap>, BackgroundError> {
    if !path.exists() {
        return Ok(None);
    }
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(Some(Pixmap::from_pixels(width, height, img.into_raw())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_style_is_a_plain_fill() {
        let desc = BackgroundDescriptor {
            style: BackgroundStyle::None,
            color: Rgba(10, 20, 30, 255),
            spacing: 40,
        };
        let pm = render_procedural(&desc, 10, 10);
        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(pm.get_pixel(x, y), [10, 20, 30, 255]);
            }
        }
    }

    #[test]
    fn grid_style_draws_both_axes() {
        let desc = BackgroundDescriptor {
            style: BackgroundStyle::Grid,
            color: Rgba(255, 255, 255, 255),
            spacing: 5,
        };
        let pm = render_procedural(&desc, 20, 20);
        assert_ne!(pm.get_pixel(5, 0), [255, 255, 255, 255]);
        assert_ne!(pm.get_pixel(0, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn lines_style_only_draws_horizontal() {
        let desc = BackgroundDescriptor {
            style: BackgroundStyle::Lines,
            color: Rgba(255, 255, 255, 255),
            spacing: 5,
        };
        let pm = render_procedural(&desc, 20, 20);
        assert_ne!(pm.get_pixel(0, 5), [255, 255, 255, 255]);
        assert_eq!(pm.get_pixel(5, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn missing_image_backdrop_is_none_not_error() {
        let result = load_image_backdrop(std::path::Path::new("/nonexistent/bg.png")).unwrap();
        assert!(result.is_none());
    }
}
