//! Bundle read/write: metadata JSON, page PNGs, background images, object
//! sidecars, edgeless-mode tile manifest plus per-tile PNGs, legacy-metadata
//! migration, combined-canvas save splitting (spec.md §4.H, §3).
//!
//! Metadata writes go to a sibling temp file and are renamed into place,
//! so a half-written file never becomes the bundle's metadata.

use crate::document::{Document, DocumentMetadata};
use crate::error::{CanvasError, CanvasResult};
use crate::ids::DocumentId;
use speedynote_canvas_render::Pixmap;
use std::fs;
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = ".speedynote_metadata.json";

pub fn metadata_path(bundle_path: &Path) -> PathBuf {
    bundle_path.join(METADATA_FILE)
}

pub fn page_png_path(bundle_path: &Path, doc_id: DocumentId, page_index: u32) -> PathBuf {
    bundle_path.join(format!("{}_{:05}.png", doc_id.0.simple(), page_index))
}

pub fn background_png_path(bundle_path: &Path, doc_id: DocumentId, page_index: u32) -> PathBuf {
    bundle_path.join(format!("bg_{}_{:05}.png", doc_id.0.simple(), page_index))
}

pub fn background_size_path(bundle_path: &Path, doc_id: DocumentId, page_index: u32) -> PathBuf {
    bundle_path.join(format!(".{}_bgsize_{:05}.txt", doc_id.0.simple(), page_index))
}

pub fn markdown_objects_path(bundle_path: &Path, doc_id: DocumentId, page_index: u32) -> PathBuf {
    bundle_path.join(format!("{}_markdown_{:05}.json", doc_id.0.simple(), page_index))
}

pub fn picture_objects_path(bundle_path: &Path, doc_id: DocumentId, page_index: u32) -> PathBuf {
    bundle_path.join(format!("{}_pictures_{:05}.json", doc_id.0.simple(), page_index))
}

pub fn tile_index_path(bundle_path: &Path, doc_id: DocumentId) -> PathBuf {
    bundle_path.join(format!("{}_tile_index.json", doc_id.0.simple()))
}

pub fn tile_png_path(bundle_path: &Path, doc_id: DocumentId, coord: crate::page::TileCoord) -> PathBuf {
    bundle_path.join(format!("{}_tile_{}_{}.png", doc_id.0.simple(), coord.x, coord.y))
}

pub fn annotated_export_path(bundle_path: &Path, doc_id: DocumentId, page_index: u32) -> PathBuf {
    // User-facing export page numbers are 1-based, zero-padded to 3 digits.
    bundle_path.join(format!("annotated_{}_page_{:03}.png", doc_id.0.simple(), page_index + 1))
}

/// Write `bytes` to `path` atomically: write to a sibling `.tmp` file, then
/// rename over the destination. Used for every write where a half-written
/// file on crash would corrupt state (spec.md §7 Atomicity).
fn write_atomic(path: &Path, bytes: &[u8]) -> CanvasResult<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn save_metadata(bundle_path: &Path, metadata: &DocumentMetadata) -> CanvasResult<()> {
    let json = serde_json::to_vec_pretty(metadata)?;
    write_atomic(&metadata_path(bundle_path), &json)
}

pub fn load_metadata(bundle_path: &Path) -> CanvasResult<Option<DocumentMetadata>> {
    let path = metadata_path(bundle_path);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&json)?))
}

/// Legacy flat-file metadata, superseded by the JSON format (spec.md §4.H).
struct LegacyMetadata {
    notebook_id: Option<String>,
    pdf_path: Option<PathBuf>,
    background_config: Option<String>,
    bookmarks: Option<String>,
}

fn read_legacy(bundle_path: &Path) -> LegacyMetadata {
    let read = |name: &str| fs::read_to_string(bundle_path.join(name)).ok();
    LegacyMetadata {
        notebook_id: read(".notebook_id.txt"),
        pdf_path: read(".pdf_path.txt").map(PathBuf::from),
        background_config: read(".background_config.txt"),
        bookmarks: read(".bookmarks.txt"),
    }
}

fn legacy_exists(bundle_path: &Path) -> bool {
    [".notebook_id.txt", ".pdf_path.txt", ".background_config.txt", ".bookmarks.txt"]
        .iter()
        .any(|name| bundle_path.join(name).exists())
}

/// Migrate legacy flat-file metadata into the JSON format, deleting the
/// legacy files only after the JSON write succeeds (spec.md §4.H Migration;
/// legacy files act as fallback until then). Idempotent: running this on an
/// already-migrated bundle (no legacy files present) is a no-op.
pub fn migrate_legacy_metadata(bundle_path: &Path, mode: crate::document::DocumentMode) -> CanvasResult<Option<DocumentMetadata>> {
    if load_metadata(bundle_path)?.is_some() {
        return Ok(None);
    }
    if !legacy_exists(bundle_path) {
        return Ok(None);
    }

    let legacy = read_legacy(bundle_path);
    let mut metadata = DocumentMetadata::new(mode);
    if let Some(pdf_path) = legacy.pdf_path {
        metadata.linked_pdf_path = Some(pdf_path);
    }
    if let Some(config) = legacy.background_config {
        if let Some(descriptor) = parse_legacy_background(&config) {
            metadata.background = descriptor;
        }
    }
    if let Some(bookmarks) = legacy.bookmarks {
        for line in bookmarks.lines().filter(|l| !l.is_empty()) {
            if let Some((id, label)) = line.split_once('\t') {
                metadata.add_bookmark(id, label);
            }
        }
    }
    let _ = legacy.notebook_id;

    save_metadata(bundle_path, &metadata)?;

    for name in [".notebook_id.txt", ".pdf_path.txt", ".background_config.txt", ".bookmarks.txt"] {
        let _ = fs::remove_file(bundle_path.join(name));
    }

    Ok(Some(metadata))
}

fn parse_legacy_background(config: &str) -> Option<speedynote_canvas_render::BackgroundDescriptor> {
    use speedynote_canvas_render::{BackgroundStyle, Rgba};
    let mut parts = config.split(',');
    let style = match parts.next()? {
        "none" => BackgroundStyle::None,
        "lines" => BackgroundStyle::Lines,
        "grid" => BackgroundStyle::Grid,
        _ => return None,
    };
    let spacing: u32 = parts.next()?.parse().ok()?;
    Some(speedynote_canvas_render::BackgroundDescriptor { style, color: Rgba::default(), spacing })
}

/// Encode a pixmap as PNG bytes.
fn encode_png(pixmap: &Pixmap) -> CanvasResult<Vec<u8>> {
    let image_buffer = image::RgbaImage::from_raw(pixmap.width, pixmap.height, pixmap.pixels.clone())
        .expect("pixmap buffer length matches width*height*4");
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    image::DynamicImage::ImageRgba8(image_buffer).write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(bytes)
}

fn decode_png(bytes: &[u8]) -> CanvasResult<Pixmap> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(Pixmap::from_pixels(width, height, img.into_raw()))
}

/// Result of saving a (possibly combined) page buffer: which pages were
/// written, for cache invalidation by the caller.
pub struct SaveOutcome {
    pub pages_written: Vec<u32>,
}

/// Save page `index`'s buffer per spec.md §4.H Save semantics. If the
/// buffer `is_combined`, splits top/bottom halves, writing the top half to
/// page `index` and additively compositing the bottom half onto page
/// `index + 1` (merge, not overwrite — the bottom half is not authoritative
/// per spec.md §3).
pub fn save_page(bundle_path: &Path, doc_id: DocumentId, index: u32, buffer: &speedynote_canvas_render::Buffer) -> CanvasResult<SaveOutcome> {
    if !buffer.is_combined {
        let bytes = encode_png(&buffer.pixmap)?;
        write_atomic(&page_png_path(bundle_path, doc_id, index), &bytes)?;
        return Ok(SaveOutcome { pages_written: vec![index] });
    }

    let single_height = buffer.pixmap.height / 2;
    let top = crop(&buffer.pixmap, 0, 0, buffer.pixmap.width, single_height);
    let bottom = crop(&buffer.pixmap, 0, single_height, buffer.pixmap.width, buffer.pixmap.height - single_height);

    let top_bytes = encode_png(&top)?;
    write_atomic(&page_png_path(bundle_path, doc_id, index), &top_bytes)?;

    let mut pages_written = vec![index];
    if bottom.has_any_opaque_pixel() {
        let next_path = page_png_path(bundle_path, doc_id, index + 1);
        let mut merged = if next_path.exists() {
            decode_png(&fs::read(&next_path)?)?
        } else {
            Pixmap::new(bottom.width, bottom.height)
        };
        merged.composite_source_over(&bottom, 0, 0);
        let merged_bytes = encode_png(&merged)?;
        write_atomic(&next_path, &merged_bytes)?;
        pages_written.push(index + 1);
    }

    Ok(SaveOutcome { pages_written })
}

fn crop(pixmap: &Pixmap, x: u32, y: u32, width: u32, height: u32) -> Pixmap {
    let mut out = Pixmap::new(width, height);
    for row in 0..height {
        for col in 0..width {
            out.set_pixel(col, row, pixmap.get_pixel(x + col, y + row));
        }
    }
    out
}

/// Load page `index`'s buffer from disk, or `None` if absent (initializes
/// transparent per spec.md §3 Lifecycle).
pub fn load_page_pixmap(bundle_path: &Path, doc_id: DocumentId, index: u32) -> CanvasResult<Option<Pixmap>> {
    let path = page_png_path(bundle_path, doc_id, index);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(decode_png(&fs::read(&path)?)?))
}

/// Write a single tile's raster to disk (edgeless mode, spec.md §3: "one
/// image per tile").
fn save_tile(bundle_path: &Path, doc_id: DocumentId, coord: crate::page::TileCoord, pixmap: &Pixmap) -> CanvasResult<()> {
    let bytes = encode_png(pixmap)?;
    write_atomic(&tile_png_path(bundle_path, doc_id, coord), &bytes)
}

/// Load a single tile's raster, or `None` if it has never been written.
fn load_tile_pixmap(bundle_path: &Path, doc_id: DocumentId, coord: crate::page::TileCoord) -> CanvasResult<Option<Pixmap>> {
    let path = tile_png_path(bundle_path, doc_id, coord);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(decode_png(&fs::read(&path)?)?))
}

/// Write the tile manifest (which (x, y) pairs exist) and every tile
/// currently resident in memory (spec.md §3: "Tiles are written to disk as
/// a tile index ... plus one image per tile").
pub fn save_tiles(bundle_path: &Path, doc_id: DocumentId, document: &Document) -> CanvasResult<()> {
    let manifest = serde_json::to_vec_pretty(document.tile_index())?;
    write_atomic(&tile_index_path(bundle_path, doc_id), &manifest)?;

    for (coord, tile) in document.loaded_tiles() {
        save_tile(bundle_path, doc_id, *coord, &tile.buffer.pixmap)?;
    }
    Ok(())
}

/// Load the tile manifest and hydrate every manifested tile into
/// `document`, allocating each at `tile_size` before overwriting its pixmap
/// with the decoded PNG. A manifest entry whose PNG is missing is skipped
/// (the tile stays blank, as on first allocation).
pub fn load_tiles(bundle_path: &Path, doc_id: DocumentId, document: &mut Document, tile_size: u32) -> CanvasResult<()> {
    let path = tile_index_path(bundle_path, doc_id);
    if !path.exists() {
        return Ok(());
    }
    let index: crate::page::TileIndex = serde_json::from_slice(&fs::read(&path)?)?;

    for &coord in &index.coords {
        let Some(pixmap) = load_tile_pixmap(bundle_path, doc_id, coord)? else { continue };
        document.tile_or_allocate(coord, tile_size).buffer.pixmap = pixmap;
    }
    document.set_tile_index(index);
    Ok(())
}

/// Write a page's picture and link objects to their separate sidecar files
/// (spec.md §4.H: `{docId}_pictures_{N:05}.json` and `{docId}_markdown_{N:05}.json`).
pub fn save_object_layer_page(
    bundle_path: &Path,
    doc_id: DocumentId,
    page_index: u32,
    layer: &crate::objects::ObjectLayer,
) -> CanvasResult<()> {
    let pictures = layer.pictures_json(page_index)?;
    write_atomic(&picture_objects_path(bundle_path, doc_id, page_index), pictures.as_bytes())?;
    let links = layer.links_json(page_index)?;
    write_atomic(&markdown_objects_path(bundle_path, doc_id, page_index), links.as_bytes())?;
    Ok(())
}

/// Load a page's picture and link objects from their sidecar files into
/// `layer`, leaving it untouched for files that don't exist yet.
pub fn load_object_layer_page(
    bundle_path: &Path,
    doc_id: DocumentId,
    page_index: u32,
    layer: &mut crate::objects::ObjectLayer,
) -> CanvasResult<()> {
    let pictures_path = picture_objects_path(bundle_path, doc_id, page_index);
    if pictures_path.exists() {
        layer.load_pictures_json(page_index, &fs::read_to_string(&pictures_path)?);
    }
    let links_path = markdown_objects_path(bundle_path, doc_id, page_index);
    if links_path.exists() {
        layer.load_links_json(page_index, &fs::read_to_string(&links_path)?);
    }
    Ok(())
}

/// Composite backdrop + strokes into a single opaque PNG for export
/// (spec.md §4.H Annotated PDF export), reporting the `AnnotatedImageSaved`
/// event for the host to observe.
pub fn export_annotated_page(
    bundle_path: &Path,
    doc_id: DocumentId,
    index: u32,
    backdrop: &Pixmap,
    strokes: &Pixmap,
) -> CanvasResult<crate::events::EngineEvent> {
    let mut composite = Pixmap::new(backdrop.width.max(strokes.width), backdrop.height.max(strokes.height));
    for px in composite.pixels.chunks_exact_mut(4) {
        px[3] = 255;
    }
    composite.composite_source_over(backdrop, 0, 0);
    composite.composite_source_over(strokes, 0, 0);
    let path = annotated_export_path(bundle_path, doc_id, index);
    let bytes = encode_png(&composite)?;
    write_atomic(&path, &bytes)?;
    Ok(crate::events::EngineEvent::AnnotatedImageSaved { path })
}

/// Open or migrate a bundle's metadata, surfacing corruption only when both
/// the JSON and the legacy fallback are unusable (spec.md §7 Propagation).
pub fn open_or_migrate(bundle_path: &Path, default_mode: crate::document::DocumentMode) -> CanvasResult<DocumentMetadata> {
    if let Some(metadata) = load_metadata(bundle_path)? {
        return Ok(metadata);
    }
    if let Some(migrated) = migrate_legacy_metadata(bundle_path, default_mode)? {
        return Ok(migrated);
    }
    if legacy_exists(bundle_path) {
        return Err(CanvasError::BundleCorrupt("legacy files present but unparseable".into()));
    }
    Ok(DocumentMetadata::new(default_mode))
}

pub fn load_document(bundle_path: PathBuf, default_mode: crate::document::DocumentMode) -> CanvasResult<Document> {
    let metadata = open_or_migrate(&bundle_path, default_mode)?;
    Ok(Document::new(bundle_path, metadata))
}
