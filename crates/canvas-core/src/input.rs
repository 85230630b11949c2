//! Stylus/mouse/touch routing, single-finger pan with inertia, pinch-zoom,
//! paged-mode autoscroll, and PDF text-selection drag (spec.md §4.G).
//!
//! The gesture state machine's shape follows `flxzt-rnote`'s
//! `camera.rs`/`pens/` zoom-pan-tool dispatch idiom. These operations
//! cannot fail, so no error enum is introduced here.

use speedynote_canvas_render::buffer::{Point, Rect, Transform, ZOOM_MAX_PERCENT, ZOOM_MIN_PERCENT};
use speedynote_canvas_render::{LinkTarget, PdfProvider};

use crate::events::EngineEvent;

const VELOCITY_RING_SIZE: usize = 5;
const INERTIA_V_MIN: f64 = 0.1;
const INERTIA_V_STOP: f64 = 0.05;
const INERTIA_FRICTION: f64 = 0.92;
const INERTIA_TICK_MS: f64 = 16.0;
const AUTOSCROLL_SAVE_MARGIN: f64 = 300.0;
const AUTOSCROLL_COOLDOWN_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Stylus,
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylusTool {
    Lasso,
    StraightLine,
    FreeDraw,
}

/// A single input occurrence the host forwards to the router.
#[derive(Debug, Clone, Copy)]
pub enum InputEvent {
    TouchBegin { contacts: u8, point: Point },
    TouchMove { contacts: u8, point: Point },
    TouchEnd,
    StylusDown { point: Point },
    StylusMove { point: Point },
    StylusUp,
    MouseDown { point: Point },
    MouseMove { point: Point },
    MouseUp,
    /// Advance internal clocks by `delta_ms`; call once per frame.
    Tick { delta_ms: f64 },
}

/// What the router decided to do with an event, for the host to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoutedAction {
    ObjectEditDispatch,
    TextSelectionDispatch,
    SelectionEngineDispatch,
    StraightLineDispatch,
    FreeDrawDispatch,
    TouchGestureDispatch,
    Ignored,
}

/// Routing context the host supplies alongside each event (spec.md §4.G
/// Routing priority — modes the router itself does not own).
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingContext {
    pub object_edit_mode_active: bool,
    pub text_selection_mode_active: bool,
    pub stylus_tool: Option<StylusTool>,
    pub mouse_draw_enabled: bool,
}

pub fn route(pointer: PointerKind, ctx: RoutingContext) -> RoutedAction {
    if ctx.object_edit_mode_active {
        return RoutedAction::ObjectEditDispatch;
    }
    if ctx.text_selection_mode_active && matches!(pointer, PointerKind::Stylus | PointerKind::Mouse) {
        return RoutedAction::TextSelectionDispatch;
    }
    match pointer {
        PointerKind::Stylus => match ctx.stylus_tool {
            Some(StylusTool::Lasso) => RoutedAction::SelectionEngineDispatch,
            Some(StylusTool::StraightLine) => RoutedAction::StraightLineDispatch,
            _ => RoutedAction::FreeDrawDispatch,
        },
        PointerKind::Touch => RoutedAction::TouchGestureDispatch,
        PointerKind::Mouse => {
            if ctx.mouse_draw_enabled {
                RoutedAction::FreeDrawDispatch
            } else {
                RoutedAction::Ignored
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityRing {
    samples: [(f64, f64); VELOCITY_RING_SIZE],
    len: usize,
    cursor: usize,
}

impl VelocityRing {
    fn push(&mut self, vx: f64, vy: f64) {
        self.samples[self.cursor] = (vx, vy);
        self.cursor = (self.cursor + 1) % VELOCITY_RING_SIZE;
        self.len = (self.len + 1).min(VELOCITY_RING_SIZE);
    }

    fn weighted_average(&self) -> (f64, f64) {
        if self.len == 0 {
            return (0.0, 0.0);
        }
        let mut sx = 0.0;
        let mut sy = 0.0;
        for &(vx, vy) in &self.samples[..self.len] {
            sx += vx;
            sy += vy;
        }
        (sx / self.len as f64, sy / self.len as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PanPhase {
    Idle,
    Active { last_point: Point, last_sample_point: Point, sample_parity: bool },
    Inertia { vx: f64, vy: f64 },
}

struct PinchState {
    initial_distance: f64,
    anchor: Point,
}

/// Single-finger pan with inertia, and two-finger pinch-zoom, as a
/// standalone state machine the router drives on touch events.
pub struct TouchGesture {
    phase: PanPhase,
    velocity: VelocityRing,
    pinch: Option<PinchState>,
}

impl TouchGesture {
    pub fn new() -> Self {
        Self { phase: PanPhase::Idle, velocity: VelocityRing::default(), pinch: None }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, PanPhase::Idle)
    }

    /// Touch-begin: stop inertia, start a single-finger pan.
    pub fn begin_single(&mut self, point: Point) {
        self.phase = PanPhase::Active { last_point: point, last_sample_point: point, sample_parity: false };
        self.velocity = VelocityRing::default();
        self.pinch = None;
    }

    /// Two-finger touch-begin: switch to pinch-zoom, cancelling any pan.
    pub fn begin_pinch(&mut self, finger_distance: f64, anchor: Point) {
        self.phase = PanPhase::Idle;
        self.pinch = Some(PinchState { initial_distance: finger_distance.max(1.0), anchor });
    }

    /// Touch-move during a single-finger pan. Returns the buffer-space pan
    /// delta to apply (already scaled by `1/z`); samples velocity every
    /// other call.
    pub fn move_single(&mut self, point: Point, zoom_factor: f64) -> Option<(f64, f64)> {
        let PanPhase::Active { last_point, last_sample_point, sample_parity } = &mut self.phase else {
            return None;
        };
        let dx = (point.x - last_point.x) / zoom_factor;
        let dy = (point.y - last_point.y) / zoom_factor;
        *last_point = point;

        *sample_parity = !*sample_parity;
        if *sample_parity {
            let sdx = point.x - last_sample_point.x;
            let sdy = point.y - last_sample_point.y;
            *last_sample_point = point;
            self.velocity.push(sdx, sdy);
        }
        Some((dx, dy))
    }

    /// Two-finger move during pinch: returns (scale_since_begin, anchor).
    pub fn move_pinch(&mut self, finger_distance: f64, anchor: Point) -> Option<(f64, Point)> {
        let pinch = self.pinch.as_mut()?;
        pinch.anchor = anchor;
        Some((finger_distance.max(1.0) / pinch.initial_distance, anchor))
    }

    /// Touch-end: transitions a single-finger pan into inertia if the
    /// weighted average velocity exceeds `v_min`; otherwise goes idle.
    pub fn end(&mut self) {
        if matches!(self.phase, PanPhase::Active { .. }) {
            let (vx, vy) = self.velocity.weighted_average();
            let speed = (vx * vx + vy * vy).sqrt();
            self.phase = if speed > INERTIA_V_MIN { PanPhase::Inertia { vx, vy } } else { PanPhase::Idle };
        } else {
            self.phase = PanPhase::Idle;
        }
        self.pinch = None;
    }

    /// Advance inertia by one tick. Returns the pan delta to apply, or
    /// `None` once inertia has stopped.
    pub fn tick_inertia(&mut self) -> Option<(f64, f64)> {
        let PanPhase::Inertia { vx, vy } = &mut self.phase else { return None };
        let dx = *vx * INERTIA_TICK_MS;
        let dy = *vy * INERTIA_TICK_MS;
        *vx *= INERTIA_FRICTION;
        *vy *= INERTIA_FRICTION;
        let speed = (*vx * *vx + *vy * *vy).sqrt();
        if speed < INERTIA_V_STOP {
            self.phase = PanPhase::Idle;
        }
        Some((dx, dy))
    }

    pub fn is_inertia_active(&self) -> bool {
        matches!(self.phase, PanPhase::Inertia { .. })
    }

    /// Cancel any active gesture immediately (tool switch, page switch,
    /// pinch-zoom entry).
    pub fn cancel(&mut self) {
        self.phase = PanPhase::Idle;
        self.pinch = None;
    }
}

impl Default for TouchGesture {
    fn default() -> Self {
        Self::new()
    }
}

/// Paged-mode autoscroll: save-zone / switch-zone thresholds plus a cooldown
/// that suppresses further autoscroll signals while one is pending.
pub struct Autoscroll {
    single_page_height: f64,
    cooldown_remaining_ms: f64,
}

impl Autoscroll {
    pub fn new(single_page_height: f64) -> Self {
        Self { single_page_height, cooldown_remaining_ms: 0.0 }
    }

    pub fn tick(&mut self, delta_ms: f64) {
        self.cooldown_remaining_ms = (self.cooldown_remaining_ms - delta_ms).max(0.0);
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_remaining_ms > 0.0
    }

    /// Evaluate a new pan-Y position against the save/switch thresholds and
    /// return the events to emit, if any.
    pub fn evaluate(&mut self, pan_y: f64, document_edited: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.in_cooldown() {
            return events;
        }

        let forward_save_zone = self.single_page_height - AUTOSCROLL_SAVE_MARGIN;
        let backward_save_zone = -5.0;
        let forward_switch = self.single_page_height;
        let backward_switch = -AUTOSCROLL_SAVE_MARGIN;

        if document_edited && (pan_y >= forward_save_zone || pan_y <= backward_save_zone) {
            events.push(EngineEvent::EarlySaveRequested);
        }

        if pan_y >= forward_switch {
            events.push(EngineEvent::AutoScrollRequested { direction: 1 });
            self.cooldown_remaining_ms = AUTOSCROLL_COOLDOWN_MS as f64;
        } else if pan_y <= backward_switch {
            events.push(EngineEvent::AutoScrollRequested { direction: -1 });
            self.cooldown_remaining_ms = AUTOSCROLL_COOLDOWN_MS as f64;
        }

        events
    }
}

/// PDF text-selection drag-rectangle, throttled to 60 Hz (spec.md §4.G.3).
pub struct TextSelectionDrag {
    start: Point,
    current: Point,
    last_emit_ms: f64,
    elapsed_ms: f64,
}

const TEXT_SELECTION_THROTTLE_MS: f64 = 1000.0 / 60.0;

impl TextSelectionDrag {
    pub fn begin(start: Point) -> Self {
        Self { start, current: start, last_emit_ms: f64::NEG_INFINITY, elapsed_ms: 0.0 }
    }

    pub fn rect(&self) -> Rect {
        let x = self.start.x.min(self.current.x);
        let y = self.start.y.min(self.current.y);
        Rect::new(x, y, (self.start.x - self.current.x).abs(), (self.start.y - self.current.y).abs())
    }

    /// Update the drag rect, returning `true` if this update should cause a
    /// text-hit-test pass (60 Hz throttle).
    pub fn update(&mut self, point: Point, delta_ms: f64) -> bool {
        self.current = point;
        self.elapsed_ms += delta_ms;
        if self.elapsed_ms - self.last_emit_ms >= TEXT_SELECTION_THROTTLE_MS {
            self.last_emit_ms = self.elapsed_ms;
            true
        } else {
            false
        }
    }
}

/// Ties the router, touch gesture, and autoscroll state together for a
/// single document view. Does not own the `Transform`; callers pass it in
/// so multiple views (e.g. PDF vs note) can share the same router logic.
pub struct GestureRouter {
    pub touch: TouchGesture,
    pub autoscroll: Autoscroll,
    text_drag: Option<TextSelectionDrag>,
    markdown_selection_mode: bool,
}

impl GestureRouter {
    pub fn new(single_page_height: f64) -> Self {
        Self {
            touch: TouchGesture::new(),
            autoscroll: Autoscroll::new(single_page_height),
            text_drag: None,
            markdown_selection_mode: false,
        }
    }

    pub fn route(&self, pointer: PointerKind, ctx: RoutingContext) -> RoutedAction {
        route(pointer, ctx)
    }

    /// Apply a single-finger pan delta to `transform`, already clamped by
    /// `Transform::pan_by`, and report the resulting pan position.
    pub fn apply_pan_delta(&self, transform: &mut Transform, dx: f64, dy: f64) -> EngineEvent {
        transform.pan_by(dx, dy);
        let pan = transform.pan();
        EngineEvent::PanChanged { x: pan.x, y: pan.y }
    }

    /// Touch-begin with one contact: start a single-finger pan.
    pub fn begin_touch_pan(&mut self, point: Point) -> EngineEvent {
        self.touch.begin_single(point);
        EngineEvent::TouchPanningChanged { active: true }
    }

    /// Touch-end: settle the pan (into inertia or idle) and report the
    /// gesture's end. `TouchPanningChanged { active: false }` is only
    /// emitted if a pan was actually in progress.
    pub fn end_touch_gesture(&mut self) -> Vec<EngineEvent> {
        let was_panning = matches!(self.touch.phase, PanPhase::Active { .. });
        self.touch.end();
        let mut events = Vec::new();
        if was_panning {
            events.push(EngineEvent::TouchPanningChanged { active: false });
        }
        events.push(EngineEvent::TouchGestureEnded);
        events
    }

    /// Apply an incremental pinch-zoom scale (relative to the zoom percent
    /// active when the pinch began) to `transform`, anchored at the
    /// midpoint between fingers (spec.md §4.G: "Emit pan and zoom signals
    /// on every frame").
    pub fn apply_pinch_scale(&self, transform: &mut Transform, base_percent: u32, scale: f64, anchor: Point) -> EngineEvent {
        let percent = (base_percent as f64 * scale).clamp(ZOOM_MIN_PERCENT as f64, ZOOM_MAX_PERCENT as f64);
        transform.set_internal_zoom(percent, anchor);
        EngineEvent::ZoomChanged { percent: transform.internal_zoom().round() as u32 }
    }

    /// Touch-end during a pinch: snap the internal float zoom to an
    /// integer percent and report the settled value.
    pub fn finish_pinch_zoom(&self, transform: &mut Transform) -> EngineEvent {
        transform.snap_zoom();
        EngineEvent::ZoomChanged { percent: transform.zoom_percent() }
    }

    pub fn begin_text_selection(&mut self, start: Point) {
        self.text_drag = Some(TextSelectionDrag::begin(start));
    }

    pub fn update_text_selection(&mut self, point: Point, delta_ms: f64) -> Option<Rect> {
        let drag = self.text_drag.as_mut()?;
        if drag.update(point, delta_ms) {
            Some(drag.rect())
        } else {
            None
        }
    }

    pub fn end_text_selection(&mut self) -> Option<Rect> {
        self.text_drag.take().map(|d| d.rect())
    }

    /// On release of a PDF text-selection drag: hit-test the drag rect
    /// against the page's text boxes first (spec.md §4.G.3: "show a context
    /// menu for Copy ... if any text"), falling back to the link-hit
    /// handler when no text box intersects.
    pub fn end_text_selection_pdf(&mut self, provider: &dyn PdfProvider, page_index: u16) -> Option<EngineEvent> {
        let rect = self.end_text_selection()?;

        if let Ok(boxes) = provider.text_boxes(page_index) {
            let mut selected = String::new();
            for text_box in &boxes {
                let box_rect = Rect::new(text_box.x as f64, text_box.y as f64, text_box.width as f64, text_box.height as f64);
                if rects_intersect(rect, box_rect) {
                    if !selected.is_empty() {
                        selected.push(' ');
                    }
                    selected.push_str(&text_box.text);
                }
            }
            if !selected.is_empty() {
                return Some(EngineEvent::PdfTextSelected { text: selected });
            }
        }

        let links = provider.links(page_index).ok()?;
        links.iter().find_map(|link| {
            let link_rect = Rect::new(link.x as f64, link.y as f64, link.width as f64, link.height as f64);
            if !rects_intersect(rect, link_rect) {
                return None;
            }
            match link.target {
                LinkTarget::Page(target_page) => Some(EngineEvent::PdfLinkClicked { target_page: target_page as u32 }),
                LinkTarget::Uri(_) => None,
            }
        })
    }

    /// Toggle markdown-note selection mode, reporting the change only when
    /// it actually flips (repeated sets are a no-op, not a fresh event).
    pub fn set_markdown_selection_mode(&mut self, enabled: bool) -> Option<EngineEvent> {
        if self.markdown_selection_mode == enabled {
            return None;
        }
        self.markdown_selection_mode = enabled;
        Some(EngineEvent::MarkdownSelectionModeChanged { enabled })
    }

    pub fn markdown_selection_mode(&self) -> bool {
        self.markdown_selection_mode
    }

    /// Tool switch, page switch, or pinch-zoom entry: cancel pending
    /// strokes (caller's concern), inertia, and text-selection timers.
    pub fn cancel_all(&mut self) {
        self.touch.cancel();
        self.text_drag = None;
    }
}

/// Axis-aligned rectangle intersection test, used for PDF text/link hit
/// testing against a drag rectangle.
fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.x < b.x + b.width && a.x + a.width > b.x && a.y < b.y + b.height && a.y + a.height > b.y
}
