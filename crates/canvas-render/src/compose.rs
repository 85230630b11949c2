//! Frame composition: layers a backdrop, the persistent stroke buffer,
//! inserted objects, and a selection overlay into one pixmap for display.
//! See spec.md §4 Data flow.

use crate::background::{render_procedural, Backdrop};
use crate::Pixmap;

/// An already-rasterized object layer element (a Picture's image, or a
/// Link's placeholder rect rendering) to be blitted at an offset.
pub struct ObjectLayer<'a> {
    pub pixmap: &'a Pixmap,
    pub x: i64,
    pub y: i64,
}

/// Floating selection content, blitted last (above strokes and objects)
/// while a lasso selection is held or being moved (spec.md §4.D).
pub struct SelectionOverlay<'a> {
    pub pixmap: &'a Pixmap,
    pub x: i64,
    pub y: i64,
}

/// Compose one frame: backdrop, then objects (in z-order), then the stroke
/// buffer, then the selection overlay if present. All layers are expected
/// to already be sized to the destination buffer's dimensions, except for
/// object layers and the selection overlay, which are blitted at an offset.
pub fn compose_frame(
    width: u32,
    height: u32,
    backdrop: &Backdrop,
    objects: &[ObjectLayer<'_>],
    stroke_buffer: &Pixmap,
    selection: Option<&SelectionOverlay<'_>>,
) -> Pixmap {
    let mut frame = match backdrop {
        Backdrop::Procedural(descriptor) => render_procedural(descriptor, width, height),
        Backdrop::Image(pixmap) | Backdrop::Pdf(pixmap) => pixmap.clone(),
    };

    if frame.width != width || frame.height != height {
        frame = resize_canvas(&frame, width, height);
    }

    for object in objects {
        frame.composite_source_over(object.pixmap, object.x, object.y);
    }

    frame.composite_source_over(stroke_buffer, 0, 0);

    if let Some(selection) = selection {
        frame.composite_source_over(selection.pixmap, selection.x, selection.y);
    }

    frame
}

/// Pad or crop a pixmap to the given size, preserving its top-left content
/// (mirrors [`crate::buffer::Buffer::resize`]'s content-preservation policy).
fn resize_canvas(pixmap: &Pixmap, width: u32, height: u32) -> Pixmap {
    let mut resized = Pixmap::new(width, height);
    resized.composite_source_over(pixmap, 0, 0);
    resized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{BackgroundDescriptor, BackgroundStyle, Rgba};

    #[test]
    fn composed_frame_layers_objects_above_backdrop_and_strokes_above_objects() {
        let backdrop = Backdrop::Procedural(BackgroundDescriptor {
            style: BackgroundStyle::None,
            color: Rgba(255, 255, 255, 255),
            spacing: 40,
        });

        let mut object_pixmap = Pixmap::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                object_pixmap.set_pixel(x, y, [0, 255, 0, 255]);
            }
        }
        let object = ObjectLayer { pixmap: &object_pixmap, x: 5, y: 5 };

        let mut stroke_buffer = Pixmap::new(20, 20);
        stroke_buffer.set_pixel(7, 7, [255, 0, 0, 255]);

        let frame = compose_frame(20, 20, &backdrop, &[object], &stroke_buffer, None);

        assert_eq!(frame.get_pixel(7, 7), [255, 0, 0, 255]);
        assert_eq!(frame.get_pixel(6, 6), [0, 255, 0, 255]);
        assert_eq!(frame.get_pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn selection_overlay_renders_above_everything() {
        let backdrop = Backdrop::Procedural(BackgroundDescriptor::default());
        let stroke_buffer = Pixmap::new(10, 10);
        let mut selection_pixmap = Pixmap::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                selection_pixmap.set_pixel(x, y, [0, 0, 255, 255]);
            }
        }
        let selection = SelectionOverlay { pixmap: &selection_pixmap, x: 2, y: 2 };

        let frame = compose_frame(10, 10, &backdrop, &[], &stroke_buffer, Some(&selection));
        assert_eq!(frame.get_pixel(3, 3), [0, 0, 255, 255]);
    }

    #[test]
    fn mismatched_backdrop_size_is_padded_not_stretched() {
        let small_pixmap = Pixmap::new(5, 5);
        let backdrop = Backdrop::Image(small_pixmap);
        let stroke_buffer = Pixmap::new(10, 10);
        let frame = compose_frame(10, 10, &backdrop, &[], &stroke_buffer, None);
        assert_eq!(frame.width, 10);
        assert_eq!(frame.height, 10);
    }
}
