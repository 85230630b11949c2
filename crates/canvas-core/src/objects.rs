//! Inserted objects: pictures and links, hit-testing, drag/resize with
//! outline preview, clipboard-paste, persistence (spec.md §4.E).
//!
//! Hit-testing and handle generation generalize a CAD-style manipulation
//! module's `ManipulationHandle`/`HandleType`/`generate_handles` pattern
//! to picture/link rectangles.

use crate::ids::ObjectId;
use speedynote_canvas_render::buffer::{Point, Rect};

const HANDLE_SIZE: f64 = 12.0;
const HEADER_HEIGHT: f64 = 32.0;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum LinkSlot {
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "position")]
    Position { target_page: u32, point: (f64, f64) },
    #[serde(rename = "url")]
    Url { url: String },
    #[serde(rename = "markdown")]
    Markdown { note_id: String },
}

impl Default for LinkSlot {
    fn default() -> Self {
        LinkSlot::Empty
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PictureObject {
    pub id: ObjectId,
    /// Image path relative to the bundle directory.
    pub image_path: String,
    pub rect: RectDescriptor,
    pub maintain_aspect_ratio: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LinkObject {
    pub id: ObjectId,
    pub rect: RectDescriptor,
    pub description: String,
    pub color: (u8, u8, u8, u8),
    pub slots: [LinkSlot; 3],
}

/// Plain-data rectangle, serializable, in canvas-space coordinates.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RectDescriptor {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectDescriptor {
    pub fn to_rect(self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn from_rect(r: Rect) -> Self {
        Self { x: r.x, y: r.y, width: r.width, height: r.height }
    }

    pub fn clamp_to_bounds(&mut self, canvas_width: f64, canvas_height: f64) {
        self.x = self.x.clamp(0.0, (canvas_width - self.width).max(0.0));
        self.y = self.y.clamp(0.0, (canvas_height - self.height).max(0.0));
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum InsertedObject {
    Picture(PictureObject),
    Link(LinkObject),
}

impl InsertedObject {
    pub fn id(&self) -> ObjectId {
        match self {
            InsertedObject::Picture(p) => p.id,
            InsertedObject::Link(l) => l.id,
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            InsertedObject::Picture(p) => p.rect.to_rect(),
            InsertedObject::Link(l) => l.rect.to_rect(),
        }
    }

    fn set_rect(&mut self, rect: Rect) {
        match self {
            InsertedObject::Picture(p) => p.rect = RectDescriptor::from_rect(rect),
            InsertedObject::Link(l) => l.rect = RectDescriptor::from_rect(rect),
        }
    }

    pub fn maintains_aspect_ratio(&self) -> bool {
        matches!(self, InsertedObject::Picture(p) if p.maintain_aspect_ratio)
    }
}

/// The hit-test zone a point falls into, relative to an object's rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitZone {
    DeleteButton,
    ResizeHandle(ResizeHandle),
    HeaderBar,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

/// Hit-test a point (canvas coordinates) against an object's header, delete
/// button, 8 resize handles, and body (spec.md §4.E).
pub fn hit_test(object_rect: Rect, point: Point) -> Option<HitZone> {
    let header = Rect::new(object_rect.x, object_rect.y - HEADER_HEIGHT, object_rect.width, HEADER_HEIGHT);
    let delete_button = Rect::new(header.x + header.width - HEADER_HEIGHT, header.y, HEADER_HEIGHT, HEADER_HEIGHT);

    if rect_contains(delete_button, point) {
        return Some(HitZone::DeleteButton);
    }

    for (handle, center) in resize_handle_centers(object_rect) {
        let zone = Rect::new(center.x - HANDLE_SIZE / 2.0, center.y - HANDLE_SIZE / 2.0, HANDLE_SIZE, HANDLE_SIZE);
        if rect_contains(zone, point) {
            return Some(HitZone::ResizeHandle(handle));
        }
    }

    if rect_contains(header, point) {
        return Some(HitZone::HeaderBar);
    }

    if rect_contains(object_rect, point) {
        return Some(HitZone::Body);
    }

    None
}

fn rect_contains(r: Rect, p: Point) -> bool {
    p.x >= r.x && p.x < r.x + r.width && p.y >= r.y && p.y < r.y + r.height
}

fn resize_handle_centers(rect: Rect) -> [(ResizeHandle, Point); 8] {
    let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);
    let cx = x + w / 2.0;
    let cy = y + h / 2.0;
    [
        (ResizeHandle::TopLeft, Point::new(x, y)),
        (ResizeHandle::TopRight, Point::new(x + w, y)),
        (ResizeHandle::BottomLeft, Point::new(x, y + h)),
        (ResizeHandle::BottomRight, Point::new(x + w, y + h)),
        (ResizeHandle::Top, Point::new(cx, y)),
        (ResizeHandle::Bottom, Point::new(cx, y + h)),
        (ResizeHandle::Left, Point::new(x, cy)),
        (ResizeHandle::Right, Point::new(x + w, cy)),
    ]
}

/// Adaptive throttle interval for drag/resize repaints, based on movement
/// distance since the last repaint (spec.md §4.E: 8/12/16 ms).
pub fn drag_throttle_millis(movement_distance: f64) -> u64 {
    if movement_distance > 40.0 {
        8
    } else if movement_distance > 15.0 {
        12
    } else {
        16
    }
}

/// Active edit-mode drag/resize state. The object's actual rect updates only
/// on mouse-up; `preview_rect` tracks the in-progress outline.
pub struct EditState {
    pub object_id: ObjectId,
    pub handle: HitZone,
    pub original_rect: Rect,
    pub preview_rect: Rect,
    drag_start: Point,
}

impl EditState {
    pub fn begin(object_id: ObjectId, handle: HitZone, rect: Rect, drag_start: Point) -> Self {
        Self { object_id, handle, original_rect: rect, preview_rect: rect, drag_start }
    }

    /// Update the preview rect for a drag-to `point`, applying aspect-lock
    /// resize math if requested (spec.md §4.E Resize with aspect ratio).
    pub fn update(&mut self, point: Point, maintain_aspect_ratio: bool, aspect_ratio: f32) {
        let dx = point.x - self.drag_start.x;
        let dy = point.y - self.drag_start.y;

        let mut rect = match self.handle {
            HitZone::HeaderBar => Rect::new(self.original_rect.x + dx, self.original_rect.y + dy, self.original_rect.width, self.original_rect.height),
            HitZone::ResizeHandle(handle) => resize_rect(self.original_rect, handle, dx, dy),
            _ => self.original_rect,
        };

        if maintain_aspect_ratio && matches!(self.handle, HitZone::ResizeHandle(_)) && aspect_ratio > 0.0 {
            let content_height = (rect.height - HEADER_HEIGHT).max(1.0);
            rect.width = (content_height * aspect_ratio as f64).max(1.0);
        }

        self.preview_rect = rect;
    }

    /// Union of old and new preview rects, enlarged to cover fast-motion
    /// trails (spec.md §4.E).
    pub fn repaint_union(&self, previous_preview: Rect) -> Rect {
        previous_preview.union(&self.preview_rect).inflate(HANDLE_SIZE)
    }
}

fn resize_rect(original: Rect, handle: ResizeHandle, dx: f64, dy: f64) -> Rect {
    let (mut x, mut y, mut w, mut h) = (original.x, original.y, original.width, original.height);
    match handle {
        ResizeHandle::TopLeft => {
            x += dx;
            y += dy;
            w -= dx;
            h -= dy;
        }
        ResizeHandle::TopRight => {
            y += dy;
            w += dx;
            h -= dy;
        }
        ResizeHandle::BottomLeft => {
            x += dx;
            w -= dx;
            h += dy;
        }
        ResizeHandle::BottomRight => {
            w += dx;
            h += dy;
        }
        ResizeHandle::Top => {
            y += dy;
            h -= dy;
        }
        ResizeHandle::Bottom => {
            h += dy;
        }
        ResizeHandle::Left => {
            x += dx;
            w -= dx;
        }
        ResizeHandle::Right => {
            w += dx;
        }
    }
    Rect::new(x, y, w.max(1.0), h.max(1.0))
}

/// Generate a unique clipboard-paste filename
/// `{docId}_clipboard_p{page:05}_{timestamp}_{rand8}.png` (spec.md §4.E).
pub fn clipboard_picture_filename(doc_id: crate::ids::DocumentId, page_index: u32, timestamp: u64, rand8: &str) -> String {
    format!("{}_clipboard_p{:05}_{}_{}.png", doc_id.0.simple(), page_index, timestamp, rand8)
}

/// Default size for a newly pasted picture object.
pub const DEFAULT_PICTURE_SIZE: (f64, f64) = (200.0, 150.0);

/// Per-page object store, keyed by page index; objects serialize to JSON
/// sidecars on save (spec.md §4.E Persistence). Malformed entries are
/// skipped with a `warn!` log rather than failing the whole load.
#[derive(Default)]
pub struct ObjectLayer {
    objects_by_page: std::collections::HashMap<u32, Vec<InsertedObject>>,
}

impl ObjectLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self, page_index: u32) -> &[InsertedObject] {
        self.objects_by_page.get(&page_index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn insert(&mut self, page_index: u32, object: InsertedObject) {
        self.objects_by_page.entry(page_index).or_default().push(object);
    }

    pub fn remove(&mut self, page_index: u32, id: ObjectId) -> bool {
        let Some(objects) = self.objects_by_page.get_mut(&page_index) else { return false };
        let before = objects.len();
        objects.retain(|o| o.id() != id);
        objects.len() != before
    }

    pub fn commit_edit(&mut self, page_index: u32, edit: &EditState, canvas_width: f64, canvas_height: f64) {
        if let Some(objects) = self.objects_by_page.get_mut(&page_index) {
            if let Some(object) = objects.iter_mut().find(|o| o.id() == edit.object_id) {
                let mut rect_desc = RectDescriptor::from_rect(edit.preview_rect);
                rect_desc.clamp_to_bounds(canvas_width, canvas_height);
                object.set_rect(rect_desc.to_rect());
            }
        }
    }

    /// Serialize page's picture objects, for `{docId}_pictures_{N:05}.json`.
    pub fn pictures_json(&self, page_index: u32) -> serde_json::Result<String> {
        let pictures: Vec<&PictureObject> = self
            .objects(page_index)
            .iter()
            .filter_map(|o| match o {
                InsertedObject::Picture(p) => Some(p),
                InsertedObject::Link(_) => None,
            })
            .collect();
        serde_json::to_string_pretty(&pictures)
    }

    /// Serialize page's link objects, for `{docId}_markdown_{N:05}.json`.
    pub fn links_json(&self, page_index: u32) -> serde_json::Result<String> {
        let links: Vec<&LinkObject> = self
            .objects(page_index)
            .iter()
            .filter_map(|o| match o {
                InsertedObject::Link(l) => Some(l),
                InsertedObject::Picture(_) => None,
            })
            .collect();
        serde_json::to_string_pretty(&links)
    }

    /// Load a page's picture objects from JSON, skipping malformed
    /// individual entries rather than failing the whole page (spec.md §7).
    pub fn load_pictures_json(&mut self, page_index: u32, json: &str) {
        self.load_entries_json::<PictureObject>(page_index, json, InsertedObject::Picture);
    }

    /// Load a page's link objects from JSON, skipping malformed individual
    /// entries rather than failing the whole page (spec.md §7).
    pub fn load_links_json(&mut self, page_index: u32, json: &str) {
        self.load_entries_json::<LinkObject>(page_index, json, InsertedObject::Link);
    }

    fn load_entries_json<T: serde::de::DeserializeOwned>(
        &mut self,
        page_index: u32,
        json: &str,
        wrap: fn(T) -> InsertedObject,
    ) {
        let value: serde_json::Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, page_index, "object sidecar is not valid JSON, skipping page");
                return;
            }
        };
        let Some(entries) = value.as_array() else {
            tracing::warn!(page_index, "object sidecar is not a JSON array, skipping page");
            return;
        };
        for entry in entries {
            match serde_json::from_value::<T>(entry.clone()) {
                Ok(object) => self.insert(page_index, wrap(object)),
                Err(e) => tracing::warn!(error = %e, page_index, "skipping malformed object"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_rect() -> Rect {
        Rect::new(100.0, 100.0, 200.0, 150.0)
    }

    #[test]
    fn hit_test_finds_delete_button_in_header_corner() {
        let rect = object_rect();
        let delete_point = Point::new(rect.x + rect.width - 5.0, rect.y - 10.0);
        assert_eq!(hit_test(rect, delete_point), Some(HitZone::DeleteButton));
    }

    #[test]
    fn hit_test_finds_resize_handles_at_corners() {
        let rect = object_rect();
        assert_eq!(hit_test(rect, Point::new(rect.x, rect.y)), Some(HitZone::ResizeHandle(ResizeHandle::TopLeft)));
    }

    #[test]
    fn hit_test_body_for_interior_point() {
        let rect = object_rect();
        let center = Point::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
        assert_eq!(hit_test(rect, center), Some(HitZone::Body));
    }

    #[test]
    fn hit_test_none_outside_object() {
        assert_eq!(hit_test(object_rect(), Point::new(0.0, 0.0)), None);
    }

    #[test]
    fn aspect_locked_resize_derives_width_from_content_height() {
        let mut edit = EditState::begin(
            ObjectId::new(),
            HitZone::ResizeHandle(ResizeHandle::BottomRight),
            Rect::new(0.0, 0.0, 200.0, 150.0),
            Point::new(200.0, 150.0),
        );
        edit.update(Point::new(200.0, 250.0), true, 2.0);
        let content_height = edit.preview_rect.height - HEADER_HEIGHT;
        assert!((edit.preview_rect.width - content_height * 2.0).abs() < 0.01);
    }

    #[test]
    fn objects_are_clamped_to_canvas_bounds() {
        let mut rect = RectDescriptor { x: -50.0, y: 5000.0, width: 200.0, height: 150.0 };
        rect.clamp_to_bounds(1000.0, 1000.0);
        assert_eq!(rect.x, 0.0);
        assert!(rect.y <= 1000.0 - 150.0);
    }

    #[test]
    fn malformed_object_json_is_skipped_without_failing_the_page() {
        let mut layer = ObjectLayer::new();
        let json = r#"[{"not_a_picture":true}, {"id":"00000000-0000-0000-0000-000000000000","image_path":"a.png","rect":{"x":0,"y":0,"width":10,"height":10},"maintain_aspect_ratio":false}]"#;
        layer.load_pictures_json(3, json);
        assert_eq!(layer.objects(3).len(), 1);
    }

    #[test]
    fn pictures_and_links_serialize_to_separate_sidecars() {
        let mut layer = ObjectLayer::new();
        layer.insert(
            0,
            InsertedObject::Picture(PictureObject {
                id: ObjectId::new(),
                image_path: "a.png".into(),
                rect: RectDescriptor { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
                maintain_aspect_ratio: false,
            }),
        );
        layer.insert(
            0,
            InsertedObject::Link(LinkObject {
                id: ObjectId::new(),
                rect: RectDescriptor { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
                description: "note".into(),
                color: (255, 0, 0, 255),
                slots: [LinkSlot::Empty, LinkSlot::Empty, LinkSlot::Empty],
            }),
        );

        let pictures = layer.pictures_json(0).unwrap();
        let links = layer.links_json(0).unwrap();
        assert!(pictures.contains("image_path"));
        assert!(!pictures.contains("description"));
        assert!(links.contains("description"));
        assert!(!links.contains("image_path"));

        let mut reloaded = ObjectLayer::new();
        reloaded.load_pictures_json(0, &pictures);
        reloaded.load_links_json(0, &links);
        assert_eq!(reloaded.objects(0).len(), 2);
    }

    #[test]
    fn drag_throttle_scales_with_movement_distance() {
        assert_eq!(drag_throttle_millis(50.0), 8);
        assert_eq!(drag_throttle_millis(20.0), 12);
        assert_eq!(drag_throttle_millis(1.0), 16);
    }
}
