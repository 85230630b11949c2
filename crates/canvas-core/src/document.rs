//! Document: the top-level unit of save/load (spec.md §3).

use crate::ids::DocumentId;
use crate::page::{Page, Tile, TileCoord, TileIndex};
use speedynote_canvas_render::BackgroundDescriptor;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DocumentMode {
    Paged,
    Edgeless,
}

/// Document metadata, persisted as `.speedynote_metadata.json` (spec.md §4.H).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DocumentMetadata {
    pub id: DocumentId,
    pub linked_pdf_path: Option<PathBuf>,
    pub background: BackgroundDescriptor,
    pub bookmarks: Vec<Bookmark>,
    pub last_accessed_page: u32,
    pub mode: DocumentMode,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub last_modified_unix: u64,
}

impl DocumentMetadata {
    pub fn new(mode: DocumentMode) -> Self {
        Self {
            id: DocumentId::new(),
            linked_pdf_path: None,
            background: BackgroundDescriptor::default(),
            bookmarks: Vec::new(),
            last_accessed_page: 0,
            mode,
            version: 1,
            last_modified_unix: 0,
        }
    }

    pub fn add_bookmark(&mut self, id: impl Into<String>, label: impl Into<String>) {
        let id = id.into();
        if !self.bookmarks.iter().any(|b| b.id == id) {
            self.bookmarks.push(Bookmark { id, label: label.into() });
        }
    }

    pub fn remove_bookmark(&mut self, id: &str) {
        self.bookmarks.retain(|b| b.id != id);
    }
}

/// The in-memory document: metadata plus loaded pages/tiles. Pages and tiles
/// are created lazily on first access (spec.md §3 Lifecycle).
pub struct Document {
    pub bundle_path: PathBuf,
    pub metadata: DocumentMetadata,
    pages: HashMap<u32, Page>,
    tiles: HashMap<TileCoord, Tile>,
    tile_index: TileIndex,
}

impl Document {
    pub fn new(bundle_path: PathBuf, metadata: DocumentMetadata) -> Self {
        Self { bundle_path, metadata, pages: HashMap::new(), tiles: HashMap::new(), tile_index: TileIndex::default() }
    }

    pub fn id(&self) -> DocumentId {
        self.metadata.id
    }

    pub fn mode(&self) -> DocumentMode {
        self.metadata.mode
    }

    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.get(&index)
    }

    pub fn page_mut(&mut self, index: u32) -> Option<&mut Page> {
        self.pages.get_mut(&index)
    }

    /// Insert a freshly loaded or newly allocated page.
    pub fn insert_page(&mut self, page: Page) {
        self.pages.insert(page.index, page);
    }

    pub fn has_page(&self, index: u32) -> bool {
        self.pages.contains_key(&index)
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    pub fn tile_mut(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        self.tiles.get_mut(&coord)
    }

    /// Lazily allocate a tile at `coord` if it does not yet exist, returning
    /// a mutable reference either way (spec.md §3: "first write to an
    /// unknown tile allocates it").
    pub fn tile_or_allocate(&mut self, coord: TileCoord, tile_size: u32) -> &mut Tile {
        self.tile_index.insert(coord);
        self.tiles.entry(coord).or_insert_with(|| {
            let buffer = speedynote_canvas_render::Buffer::new((tile_size as f64, tile_size as f64), (tile_size, tile_size))
                .expect("tile_size is always nonzero");
            Tile::new(coord, buffer)
        })
    }

    pub fn tile_index(&self) -> &TileIndex {
        &self.tile_index
    }

    pub fn set_tile_index(&mut self, index: TileIndex) {
        self.tile_index = index;
    }

    /// Tiles currently resident in memory, for bulk save (spec.md §3: tile
    /// index manifest plus one image per tile).
    pub fn loaded_tiles(&self) -> impl Iterator<Item = (&TileCoord, &Tile)> {
        self.tiles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmarks_add_and_remove_are_set_like() {
        let mut meta = DocumentMetadata::new(DocumentMode::Paged);
        meta.add_bookmark("b1", "Chapter 1");
        meta.add_bookmark("b1", "Chapter 1 (dup)");
        assert_eq!(meta.bookmarks.len(), 1);
        meta.remove_bookmark("b1");
        assert!(meta.bookmarks.is_empty());
    }

    #[test]
    fn tile_is_allocated_lazily_on_first_access() {
        let mut doc = Document::new(PathBuf::from("/tmp/doc"), DocumentMetadata::new(DocumentMode::Edgeless));
        let coord = TileCoord::new(2, -3);
        assert!(doc.tile(coord).is_none());
        doc.tile_or_allocate(coord, 1024);
        assert!(doc.tile(coord).is_some());
        assert!(doc.tile_index().contains(coord));
    }
}
