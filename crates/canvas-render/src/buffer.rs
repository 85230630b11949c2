//! Off-screen raster buffer and the widget/buffer/canvas coordinate transform.
//!
//! The buffer owns the pixels the user has drawn; the transform owns the
//! invertible mapping between the three coordinate spaces a point in this
//! system can be expressed in: widget-logical (what input events report),
//! buffer (where pixels live), and canvas (the object-layer coordinate
//! space, numerically identical to buffer space in this design but kept as
//! a distinct type to leave room for future subpixel scaling).

use crate::Pixmap;

/// Minimum / maximum zoom percent accepted by [`Transform::set_zoom`].
pub const ZOOM_MIN_PERCENT: u32 = 10;
pub const ZOOM_MAX_PERCENT: u32 = 400;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("cannot create a buffer with zero width or height")]
    ZeroSizedBuffer,
}

/// A 2D point, reused across the widget/buffer/canvas spaces (callers keep
/// track of which space a value lives in; the type itself is bare f64s to
/// avoid three near-identical point structs).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A rectangle in one of the coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// The smallest rect containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Grow the rect by `amount` on every side.
    pub fn inflate(&self, amount: f64) -> Rect {
        Rect::new(self.x - amount, self.y - amount, self.width + amount * 2.0, self.height + amount * 2.0)
    }
}

/// Integer pan in buffer units, plus the floating-point "inertia pan" used
/// while touch-pan decay or pinch gestures are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pan {
    pub x: i64,
    pub y: i64,
    /// Sub-integer pan accumulated during inertia/pinch; added to `x`/`y`
    /// when read, truncated back into `x`/`y` on settle.
    pub inertia_x: f64,
    pub inertia_y: f64,
}

impl Pan {
    /// The effective pan position, integer component plus any in-flight
    /// fractional inertia.
    pub fn effective(&self) -> (f64, f64) {
        (self.x as f64 + self.inertia_x, self.y as f64 + self.inertia_y)
    }

    /// Collapse inertia into the integer pan (called on gesture-end).
    pub fn settle(&mut self) {
        self.x += self.inertia_x.round() as i64;
        self.y += self.inertia_y.round() as i64;
        self.inertia_x = 0.0;
        self.inertia_y = 0.0;
    }
}

/// Pan/zoom/center math and widget <-> buffer <-> canvas coordinate
/// conversion. See spec.md §4.A.
#[derive(Debug, Clone)]
pub struct Transform {
    /// Integer zoom percent, snapped to on gesture end. Always in
    /// `[ZOOM_MIN_PERCENT, ZOOM_MAX_PERCENT]`.
    zoom_percent: u32,
    /// Floating-point zoom used for smooth pinch gestures; equals
    /// `zoom_percent` outside of an active gesture.
    internal_zoom: f64,
    pan: Pan,
    widget_width: f64,
    widget_height: f64,
    buffer_width: u32,
    buffer_height: u32,
}

impl Transform {
    pub fn new(widget_size: (f64, f64), buffer_size: (u32, u32)) -> Self {
        Self {
            zoom_percent: 100,
            internal_zoom: 100.0,
            pan: Pan::default(),
            widget_width: widget_size.0,
            widget_height: widget_size.1,
            buffer_width: buffer_size.0,
            buffer_height: buffer_size.1,
        }
    }

    pub fn zoom_percent(&self) -> u32 {
        self.zoom_percent
    }

    pub fn internal_zoom(&self) -> f64 {
        self.internal_zoom
    }

    fn zoom_factor(&self) -> f64 {
        self.internal_zoom / 100.0
    }

    pub fn pan(&self) -> Pan {
        self.pan
    }

    pub fn set_widget_size(&mut self, width: f64, height: f64) {
        self.widget_width = width;
        self.widget_height = height;
        self.clamp_pan();
    }

    fn scaled_buffer_size(&self) -> (f64, f64) {
        let z = self.zoom_factor();
        (self.buffer_width as f64 * z, self.buffer_height as f64 * z)
    }

    fn center_offset(&self) -> (f64, f64) {
        let (sw, sh) = self.scaled_buffer_size();
        let ox = if sw < self.widget_width { (self.widget_width - sw) / 2.0 } else { 0.0 };
        let oy = if sh < self.widget_height { (self.widget_height - sh) / 2.0 } else { 0.0 };
        (ox, oy)
    }

    /// widget-logical -> buffer coordinates.
    pub fn map_widget_to_buffer(&self, p: Point) -> Point {
        let z = self.zoom_factor();
        let (ox, oy) = self.center_offset();
        let (px, py) = self.pan.effective();
        Point::new((p.x - ox) / z + px, (p.y - oy) / z + py)
    }

    /// buffer -> widget-logical coordinates.
    pub fn map_buffer_to_widget(&self, p: Point) -> Point {
        let z = self.zoom_factor();
        let (ox, oy) = self.center_offset();
        let (px, py) = self.pan.effective();
        Point::new((p.x - px) * z + ox, (p.y - py) * z + oy)
    }

    /// buffer rect -> widget-logical rect (corners mapped independently,
    /// width/height recomputed so the rect stays axis-aligned post-zoom).
    pub fn map_buffer_to_widget_rect(&self, r: Rect) -> Rect {
        let top_left = self.map_buffer_to_widget(Point::new(r.x, r.y));
        let bottom_right = self.map_buffer_to_widget(Point::new(r.x + r.width, r.y + r.height));
        Rect::new(
            top_left.x,
            top_left.y,
            bottom_right.x - top_left.x,
            bottom_right.y - top_left.y,
        )
    }

    fn clamp_pan(&mut self) {
        let (sw, sh) = self.scaled_buffer_size();
        self.pan.x = clamp_pan_axis(self.pan.x, sw, self.widget_width);
        self.pan.y = clamp_pan_axis(self.pan.y, sh, self.widget_height);
    }

    /// Set pan in buffer units, clamped per spec.md §4.A.
    pub fn set_pan(&mut self, x: i64, y: i64) {
        self.pan.x = x;
        self.pan.y = y;
        self.pan.inertia_x = 0.0;
        self.pan.inertia_y = 0.0;
        self.clamp_pan();
    }

    /// Nudge pan by a delta in buffer units (used by touch-pan and inertia).
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan.inertia_x += dx;
        self.pan.inertia_y += dy;
        // Keep the integer part clamped so inertia/pan never drives the
        // view out of bounds even mid-decay.
        let (sw, sh) = self.scaled_buffer_size();
        let (ex, ey) = self.pan.effective();
        let clamped_x = clamp_pan_axis_f(ex, sw, self.widget_width);
        let clamped_y = clamp_pan_axis_f(ey, sh, self.widget_height);
        self.pan.x = clamped_x.round() as i64;
        self.pan.inertia_x = clamped_x - self.pan.x as f64;
        self.pan.y = clamped_y.round() as i64;
        self.pan.inertia_y = clamped_y - self.pan.y as f64;
    }

    pub fn settle_pan(&mut self) {
        self.pan.settle();
        self.clamp_pan();
    }

    /// Set zoom from a stable (non-gesture) integer percent, anchored at a
    /// widget-logical point that should remain visually fixed.
    pub fn set_zoom(&mut self, percent: u32, anchor: Point) {
        self.set_internal_zoom(percent as f64, anchor);
        self.snap_zoom();
    }

    /// Set zoom from a float (used during pinch gestures for sub-step
    /// smoothness), anchored at a widget-logical point.
    pub fn set_internal_zoom(&mut self, percent: f64, anchor: Point) {
        let anchor_buffer_before = self.map_widget_to_buffer(anchor);
        self.internal_zoom = percent.clamp(ZOOM_MIN_PERCENT as f64, ZOOM_MAX_PERCENT as f64);
        // Re-derive pan so the anchor point stays under the same widget pixel.
        let anchor_widget_after = self.map_buffer_to_widget(anchor_buffer_before);
        let dx = (anchor.x - anchor_widget_after.x) / self.zoom_factor();
        let dy = (anchor.y - anchor_widget_after.y) / self.zoom_factor();
        self.pan_by(dx, dy);
    }

    /// Snap `internal_zoom` to the nearest integer percent (called on
    /// gesture-end).
    pub fn snap_zoom(&mut self) {
        self.zoom_percent = self
            .internal_zoom
            .round()
            .clamp(ZOOM_MIN_PERCENT as f64, ZOOM_MAX_PERCENT as f64) as u32;
        self.internal_zoom = self.zoom_percent as f64;
        self.settle_pan();
    }

    pub fn buffer_size(&self) -> (u32, u32) {
        (self.buffer_width, self.buffer_height)
    }

    fn set_buffer_size(&mut self, width: u32, height: u32) {
        self.buffer_width = width;
        self.buffer_height = height;
        self.clamp_pan();
    }
}

fn clamp_pan_axis(pan: i64, scaled_extent: f64, widget_extent: f64) -> i64 {
    clamp_pan_axis_f(pan as f64, scaled_extent, widget_extent).round() as i64
}

fn clamp_pan_axis_f(pan: f64, scaled_extent: f64, widget_extent: f64) -> f64 {
    if scaled_extent > widget_extent {
        pan.clamp(0.0, scaled_extent - widget_extent)
    } else {
        0.0
    }
}

/// The off-screen buffer: pixels plus the transform used to paint them.
///
/// `is_combined` is the explicit flag recommended by spec.md §9 in place of
/// repeated heuristics (`height >= 1.8 * backdrop_height`) once a combined
/// canvas has actually been constructed.
pub struct Buffer {
    pub pixmap: Pixmap,
    pub transform: Transform,
    pub is_combined: bool,
    pub dirty: bool,
}

impl Buffer {
    pub fn new(widget_size: (f64, f64), buffer_size: (u32, u32)) -> Result<Self, TransformError> {
        if buffer_size.0 == 0 || buffer_size.1 == 0 {
            return Err(TransformError::ZeroSizedBuffer);
        }
        Ok(Self {
            pixmap: Pixmap::new(buffer_size.0, buffer_size.1),
            transform: Transform::new(widget_size, buffer_size),
            is_combined: false,
            dirty: false,
        })
    }

    /// Whether a buffer of `backdrop_height` height is a combined canvas,
    /// per the explicit-flag policy of spec.md §9: the height ratio check
    /// is only used when *constructing* a new combined buffer, never as a
    /// recurring heuristic once `is_combined` is known.
    pub fn height_implies_combined(buffer_height: u32, backdrop_height: u32) -> bool {
        if backdrop_height > 0 {
            (buffer_height as f64) >= 1.8 * (backdrop_height as f64)
        } else {
            buffer_height > 1400
        }
    }

    /// Recreate the buffer at a new size, preserving existing content by
    /// blitting the old buffer into the top-left of the new one. Dirty flag
    /// is cleared only if there was no content to preserve.
    pub fn resize(&mut self, new_size: (u32, u32), preserve_content: bool) -> Result<(), TransformError> {
        if new_size.0 == 0 || new_size.1 == 0 {
            return Err(TransformError::ZeroSizedBuffer);
        }
        tracing::debug!(old = ?self.pixmap_size(), new = ?new_size, "resizing canvas buffer");
        let mut new_pixmap = Pixmap::new(new_size.0, new_size.1);
        let had_content = self.pixmap.has_any_opaque_pixel();
        if preserve_content && had_content {
            let old = std::mem::replace(&mut self.pixmap, Pixmap::new(1, 1));
            new_pixmap.composite_source_over(&old, 0, 0);
        }
        self.pixmap = new_pixmap;
        self.transform.set_buffer_size(new_size.0, new_size.1);
        if !had_content {
            self.dirty = false;
        }
        Ok(())
    }

    fn pixmap_size(&self) -> (u32, u32) {
        (self.pixmap.width, self.pixmap.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn round_trip_widget_to_buffer_is_identity_within_one_pixel() {
        for &zoom in &[10u32, 50, 100, 150, 400] {
            let mut t = Transform::new((1920.0, 1080.0), (1920, 2160));
            t.set_zoom(zoom, Point::new(960.0, 540.0));
            for &(px, py) in &[(0.0, 0.0), (500.0, 500.0), (1919.0, 1079.0)] {
                let p = Point::new(px, py);
                let buf = t.map_widget_to_buffer(p);
                let back = t.map_buffer_to_widget(buf);
                assert_abs_diff_eq!(back.x, p.x, epsilon = 1.0);
                assert_abs_diff_eq!(back.y, p.y, epsilon = 1.0);
            }
        }
    }

    #[test]
    fn pan_is_clamped_when_buffer_wider_than_widget() {
        let mut t = Transform::new((800.0, 600.0), (2000, 1500));
        t.set_zoom(100, Point::new(400.0, 300.0));
        t.set_pan(100_000, 100_000);
        let (sw, sh) = (2000.0, 1500.0);
        let pan = t.pan();
        assert!(pan.x as f64 <= sw - 800.0 + 0.5);
        assert!(pan.y as f64 <= sh - 600.0 + 0.5);
        t.set_pan(-5000, -5000);
        let pan = t.pan();
        assert_eq!(pan.x, 0);
        assert_eq!(pan.y, 0);
    }

    #[test]
    fn pan_forced_to_zero_when_buffer_narrower_than_widget() {
        let mut t = Transform::new((2000.0, 2000.0), (500, 500));
        t.set_zoom(100, Point::new(1000.0, 1000.0));
        t.set_pan(50, 50);
        let pan = t.pan();
        assert_eq!(pan.x, 0);
        assert_eq!(pan.y, 0);
    }

    #[test]
    fn pinch_zoom_keeps_anchor_point_fixed() {
        let mut t = Transform::new((1920.0, 1080.0), (1920, 2160));
        let anchor = Point::new(500.0, 400.0);
        let before = t.map_widget_to_buffer(anchor);
        t.set_internal_zoom(150.0, anchor);
        let after = t.map_buffer_to_widget(before);
        assert_abs_diff_eq!(after.x, anchor.x, epsilon = 2.0);
        assert_abs_diff_eq!(after.y, anchor.y, epsilon = 2.0);
    }

    #[test]
    fn resize_preserves_content_and_clears_dirty_only_when_blank() {
        let mut buf = Buffer::new((800.0, 600.0), (100, 100)).unwrap();
        buf.dirty = false;
        buf.resize((200, 200), true).unwrap();
        assert!(!buf.dirty);

        let mut buf2 = Buffer::new((800.0, 600.0), (100, 100)).unwrap();
        buf2.pixmap.set_pixel(5, 5, [1, 2, 3, 255]);
        buf2.dirty = true;
        buf2.resize((200, 200), true).unwrap();
        assert_eq!(buf2.pixmap.get_pixel(5, 5), [1, 2, 3, 255]);
        assert!(buf2.dirty);
    }

    #[test]
    fn zero_sized_buffer_is_rejected() {
        assert!(Buffer::new((100.0, 100.0), (0, 10)).is_err());
    }

    #[test]
    fn combined_canvas_detection_uses_explicit_ratio() {
        assert!(Buffer::height_implies_combined(2000, 1000));
        assert!(!Buffer::height_implies_combined(1200, 1000));
        // No backdrop: fall back to the 1400px heuristic (spec.md §9).
        assert!(Buffer::height_implies_combined(1500, 0));
        assert!(!Buffer::height_implies_combined(1000, 0));
    }
}
