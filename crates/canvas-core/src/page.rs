//! Page and Tile: the per-unit storage backing a Document (spec.md §3).

use speedynote_canvas_render::Buffer;

/// A single page, paged-mode only. The buffer holds only user strokes and
/// rasterized objects — the PDF/background backdrop is never stored here
/// (spec.md §3: "the buffer holds only user strokes and rasterized objects").
pub struct Page {
    pub index: u32,
    pub buffer: Buffer,
    pub dirty: bool,
}

impl Page {
    pub fn new(index: u32, buffer: Buffer) -> Self {
        Self { index, buffer, dirty: false }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// Integer grid coordinate identifying a tile in edgeless mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// A fixed-size raster tile in edgeless mode, allocated lazily on first write.
pub struct Tile {
    pub coord: TileCoord,
    pub buffer: Buffer,
    pub dirty: bool,
}

impl Tile {
    pub fn new(coord: TileCoord, buffer: Buffer) -> Self {
        Self { coord, buffer, dirty: false }
    }
}

/// Manifest of which tiles exist on disk, persisted alongside the tile images.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TileIndex {
    pub coords: Vec<TileCoord>,
}

impl TileIndex {
    pub fn contains(&self, coord: TileCoord) -> bool {
        self.coords.contains(&coord)
    }

    pub fn insert(&mut self, coord: TileCoord) {
        if !self.contains(coord) {
            self.coords.push(coord);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index_insert_is_idempotent() {
        let mut index = TileIndex::default();
        index.insert(TileCoord::new(1, 2));
        index.insert(TileCoord::new(1, 2));
        assert_eq!(index.coords.len(), 1);
    }
}
