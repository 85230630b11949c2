//! Pen/marker/eraser rasterization into the buffer, straight-line preview,
//! and debounced repaint-region computation. See spec.md §4.C.

use crate::background::Rgba;
use crate::buffer::Rect;
use crate::Pixmap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The three drawing tools. Each carries its own persisted thickness slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Tool {
    Pen,
    Marker,
    Eraser,
}

impl Tool {
    /// Update-region padding multiplier `k` (spec.md §4.C).
    fn padding_k(self) -> f32 {
        match self {
            Tool::Pen => 1.0,
            Tool::Marker => 4.0,
            Tool::Eraser => 3.0,
        }
    }

    /// Whether this tool's repaints are time-throttled (60 Hz).
    fn is_throttled(self) -> bool {
        matches!(self, Tool::Marker | Tool::Eraser)
    }
}

/// Per-tool persisted thickness. Switching tools loads that tool's
/// thickness; editing thickness writes only the current tool's slot.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolThicknesses {
    pub pen: f32,
    pub marker: f32,
    pub eraser: f32,
}

impl Default for ToolThicknesses {
    fn default() -> Self {
        Self { pen: 2.0, marker: 2.0, eraser: 2.0 }
    }
}

impl ToolThicknesses {
    pub fn get(&self, tool: Tool) -> f32 {
        match tool {
            Tool::Pen => self.pen,
            Tool::Marker => self.marker,
            Tool::Eraser => self.eraser,
        }
    }

    pub fn set(&mut self, tool: Tool, value: f32) {
        match tool {
            Tool::Pen => self.pen = value,
            Tool::Marker => self.marker = value,
            Tool::Eraser => self.eraser = value,
        }
    }

    /// Multiply all three thicknesses by a zoom-ratio factor (called when
    /// the canvas resolution changes).
    pub fn scale_all(&mut self, ratio: f32) {
        self.pen *= ratio;
        self.marker *= ratio;
        self.eraser *= ratio;
    }
}

/// One stylus/mouse sample in buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeSample {
    pub x: f64,
    pub y: f64,
    pub pressure: f32,
}

impl StrokeSample {
    pub fn new(x: f64, y: f64, pressure: f32) -> Self {
        Self { x, y, pressure }
    }
}

fn effective_width(tool: Tool, thicknesses: &ToolThicknesses, pressure: f32, straight_line: bool) -> f32 {
    match tool {
        Tool::Pen => thicknesses.pen * pressure.max(0.05),
        Tool::Marker => thicknesses.marker * 8.0,
        Tool::Eraser => thicknesses.eraser * (if straight_line { 6.0 } else { 6.0 }),
    }
}

fn tool_rgba(tool: Tool, color: Rgba, straight_line: bool) -> [u8; 4] {
    match tool {
        Tool::Pen => [color.0, color.1, color.2, color.3],
        Tool::Marker => {
            let alpha = if straight_line { 80 } else { 4 };
            [color.0, color.1, color.2, alpha]
        }
        Tool::Eraser => [0, 0, 0, 0],
    }
}

/// Draw a round-capped, round-jointed segment from `p0` to `p1` onto
/// `pixmap`. Eraser segments clear (set alpha 0); everything else is
/// source-over composited, with the multi-pass marker alpha emulating a
/// highlighter.
fn rasterize_segment(pixmap: &mut Pixmap, p0: (f64, f64), p1: (f64, f64), width: f32, rgba: [u8; 4], clear: bool) {
    let radius = (width / 2.0).max(0.5) as f64;
    let dx = p1.0 - p0.0;
    let dy = p1.1 - p0.1;
    let len = (dx * dx + dy * dy).sqrt();
    let steps = ((len / (radius * 0.5).max(0.5)).ceil() as usize).max(1);

    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let cx = p0.0 + dx * t;
        let cy = p0.1 + dy * t;
        stamp_circle(pixmap, cx, cy, radius, rgba, clear);
    }
}

fn stamp_circle(pixmap: &mut Pixmap, cx: f64, cy: f64, radius: f64, rgba: [u8; 4], clear: bool) {
    let min_x = (cx - radius).floor().max(0.0) as i64;
    let max_x = (cx + radius).ceil().min(pixmap.width as f64) as i64;
    let min_y = (cy - radius).floor().max(0.0) as i64;
    let max_y = (cy + radius).ceil().min(pixmap.height as f64) as i64;
    let r2 = radius * radius;

    for y in min_y..max_y {
        for x in min_x..max_x {
            let fx = x as f64 + 0.5 - cx;
            let fy = y as f64 + 0.5 - cy;
            if fx * fx + fy * fy > r2 {
                continue;
            }
            if clear {
                pixmap.set_pixel(x as u32, y as u32, [0, 0, 0, 0]);
            } else {
                let dst = pixmap.get_pixel(x as u32, y as u32);
                pixmap.set_pixel(x as u32, y as u32, crate::source_over(rgba, dst));
            }
        }
    }
}

fn segment_bounds(p0: (f64, f64), p1: (f64, f64), width: f32, k: f32) -> Rect {
    let pad = (width * k) as f64;
    let min_x = p0.0.min(p1.0) - pad;
    let max_x = p0.0.max(p1.0) + pad;
    let min_y = p0.1.min(p1.1) - pad;
    let max_y = p0.1.max(p1.1) + pad;
    Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

const THROTTLE_INTERVAL: Duration = Duration::from_millis(16);
const BENCHMARK_WINDOW: Duration = Duration::from_secs(1);

/// Rasterizes pen/marker/eraser strokes, tracks straight-line preview state,
/// and computes (optionally throttled) repaint regions.
pub struct StrokeEngine {
    pub thicknesses: ToolThicknesses,
    current_tool: Tool,
    color: Rgba,
    straight_line_mode: bool,
    straight_line_start: Option<(f64, f64)>,
    last_point: Option<(f64, f64)>,
    /// Tool saved when a hardware eraser tip engages mid-stroke, restored on lift.
    saved_tool_for_hardware_eraser: Option<Tool>,
    pending_update_region: Option<Rect>,
    last_flush: Option<Instant>,
    segment_timestamps: VecDeque<Instant>,
}

impl StrokeEngine {
    pub fn new() -> Self {
        Self {
            thicknesses: ToolThicknesses::default(),
            current_tool: Tool::Pen,
            color: Rgba(0, 0, 0, 255),
            straight_line_mode: false,
            straight_line_start: None,
            last_point: None,
            saved_tool_for_hardware_eraser: None,
            pending_update_region: None,
            last_flush: None,
            segment_timestamps: VecDeque::new(),
        }
    }

    pub fn current_tool(&self) -> Tool {
        self.current_tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.current_tool = tool;
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.color = color;
    }

    pub fn set_straight_line_mode(&mut self, enabled: bool) {
        self.straight_line_mode = enabled;
    }

    /// Stylus reports "eraser tip": save the current tool and switch to
    /// Eraser for the duration of the stroke.
    pub fn engage_hardware_eraser(&mut self) {
        if self.saved_tool_for_hardware_eraser.is_none() {
            self.saved_tool_for_hardware_eraser = Some(self.current_tool);
            self.current_tool = Tool::Eraser;
        }
    }

    /// Restore the tool saved by [`Self::engage_hardware_eraser`] on lift.
    pub fn disengage_hardware_eraser(&mut self) {
        if let Some(tool) = self.saved_tool_for_hardware_eraser.take() {
            self.current_tool = tool;
        }
    }

    pub fn begin_stroke(&mut self, sample: StrokeSample) {
        self.last_point = Some((sample.x, sample.y));
        self.straight_line_start = Some((sample.x, sample.y));
        self.pending_update_region = None;
        self.last_flush = None;
    }

    /// Handle a move sample. Returns the buffer-space rect that should be
    /// invalidated, or `None` if the repaint is currently throttled.
    ///
    /// In straight-line mode, pen/marker strokes do not draw on move: the
    /// caller is expected to render a live preview from start to `sample`
    /// using the returned rect. The eraser is the exception — it commits
    /// continuously even in straight-line mode (spec.md §4.C).
    pub fn move_to(&mut self, pixmap: &mut Pixmap, sample: StrokeSample) -> Option<Rect> {
        let p1 = (sample.x, sample.y);
        let width = effective_width(self.current_tool, &self.thicknesses, sample.pressure, self.straight_line_mode);

        if self.straight_line_mode && self.current_tool != Tool::Eraser {
            // No drawing; only a preview-invalidation rect.
            let start = self.straight_line_start.unwrap_or(p1);
            let prev_end = self.last_point.unwrap_or(start);
            let new_preview = segment_bounds(start, p1, width, self.current_tool.padding_k());
            let prev_preview = segment_bounds(start, prev_end, width, self.current_tool.padding_k());
            self.last_point = Some(p1);
            return Some(new_preview.union(&prev_preview));
        }

        let p0 = if self.straight_line_mode && self.current_tool == Tool::Eraser {
            // Eraser straight-line: clear continuously from the fixed start.
            self.straight_line_start.unwrap_or(p1)
        } else {
            self.last_point.unwrap_or(p1)
        };

        let rgba = tool_rgba(self.current_tool, self.color, self.straight_line_mode);
        let clear = self.current_tool == Tool::Eraser;
        rasterize_segment(pixmap, p0, p1, width, rgba, clear);
        self.record_segment_timestamp();

        let bounds = segment_bounds(p0, p1, width, self.current_tool.padding_k());
        self.last_point = Some(p1);
        self.merge_and_maybe_flush(bounds)
    }

    /// Commit the final segment on stylus-up. For straight-line pen/marker
    /// strokes this draws the single start->lift segment; for the eraser
    /// (straight-line or not) it is a final completeness pass.
    pub fn end_stroke(&mut self, pixmap: &mut Pixmap, sample: StrokeSample) -> Rect {
        let p1 = (sample.x, sample.y);
        let width = effective_width(self.current_tool, &self.thicknesses, sample.pressure, self.straight_line_mode);
        let rgba = tool_rgba(self.current_tool, self.color, self.straight_line_mode);
        let clear = self.current_tool == Tool::Eraser;

        let p0 = if self.straight_line_mode {
            self.straight_line_start.unwrap_or(p1)
        } else {
            self.last_point.unwrap_or(p1)
        };

        rasterize_segment(pixmap, p0, p1, width, rgba, clear);
        self.record_segment_timestamp();

        let bounds = segment_bounds(p0, p1, width, self.current_tool.padding_k());
        self.last_point = None;
        self.straight_line_start = None;
        let region = self.pending_update_region.take().map(|r| r.union(&bounds)).unwrap_or(bounds);
        self.last_flush = None;
        region
    }

    fn merge_and_maybe_flush(&mut self, bounds: Rect) -> Option<Rect> {
        let merged = match self.pending_update_region.take() {
            Some(existing) => existing.union(&bounds),
            None => bounds,
        };

        if !self.current_tool.is_throttled() {
            return Some(merged);
        }

        let now = Instant::now();
        let should_flush = match self.last_flush {
            None => true,
            Some(last) => now.duration_since(last) >= THROTTLE_INTERVAL,
        };

        if should_flush {
            self.last_flush = Some(now);
            Some(merged)
        } else {
            self.pending_update_region = Some(merged);
            None
        }
    }

    fn record_segment_timestamp(&mut self) {
        let now = Instant::now();
        self.segment_timestamps.push_back(now);
        while let Some(&front) = self.segment_timestamps.front() {
            if now.duration_since(front) > BENCHMARK_WINDOW {
                self.segment_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of committed segments within the trailing 1-second window.
    pub fn strokes_per_second(&self) -> usize {
        self.segment_timestamps.len()
    }
}

impl Default for StrokeEngine {
    fn default() -> Self {
        Self::new()
    }
}
