//! SpeedyNote canvas core
//!
//! Document/Page/Tile data model, the Selection and Object Layer engines,
//! bundle persistence, input/gesture routing, and the error types shared
//! across the canvas crates.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod external;
pub mod ids;
pub mod input;
pub mod objects;
pub mod page;
pub mod persistence;
pub mod selection;

pub use config::CanvasConfig;
pub use document::{Bookmark, Document, DocumentMetadata, DocumentMode};
pub use engine::{CanvasEngine, CombinedPageSource};
pub use error::{CanvasError, CanvasResult};
pub use events::EngineEvent;
pub use external::{Clipboard, FilePicker, SettingsStore};
pub use ids::{DocumentId, ObjectId};
pub use input::{GestureRouter, InputEvent, RoutedAction};
pub use objects::{
    EditState, HitZone, InsertedObject, LinkObject, LinkSlot, ObjectLayer, PictureObject,
    RectDescriptor, ResizeHandle,
};
pub use page::{Page, Tile, TileCoord, TileIndex};
pub use persistence::{
    annotated_export_path, background_png_path, background_size_path, export_annotated_page,
    load_document, load_metadata, load_object_layer_page, load_page_pixmap, load_tiles,
    markdown_objects_path, metadata_path, migrate_legacy_metadata, open_or_migrate, page_png_path,
    picture_objects_path, save_metadata, save_object_layer_page, save_page, save_tiles,
    tile_index_path, tile_png_path, SaveOutcome,
};
pub use selection::{Selection, SelectionState};
