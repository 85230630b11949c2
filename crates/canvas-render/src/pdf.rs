//! PDF backdrop provider.
//!
//! Wraps PDFium behind the [`PdfProvider`] trait so the rest of the engine
//! never touches `pdfium-render` directly. PDFium page parsing/rendering is
//! not reliably safe when the same document is accessed concurrently from
//! multiple worker threads, so all operations serialize through a single
//! global mutex; the `Pdfium` instance itself is kept thread-local and
//! leaked for `'static`, since the app's worker pool only ever touches PDF
//! documents from whichever thread opened them plus this lock.

use crate::Pixmap;
use pdfium_render::prelude::*;
use std::cell::OnceCell;
use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

thread_local! {
    static PDFIUM: OnceCell<&'static Pdfium> = const { OnceCell::new() };
}

static PDFIUM_OPERATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Default render DPI for PDF backdrops (spec.md §4.B).
pub const DEFAULT_RENDER_DPI: u32 = 192;

/// Minimum non-whitespace characters for a page to be considered to have
/// "sufficient" selectable text (spec.md §4.B: deciding whether querying
/// [`PdfProvider::text_boxes`] for text selection is worth it).
const MIN_TEXT_CHARS_THRESHOLD: usize = 50;
const MIN_WORD_COUNT_THRESHOLD: usize = 10;

/// Whether `text` is substantial enough to support PDF text selection.
/// Pages with little or no embedded text (scanned pages) return `false`.
pub fn has_sufficient_text(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let char_count = text.chars().filter(|c| !c.is_whitespace()).count();
    if char_count < MIN_TEXT_CHARS_THRESHOLD {
        return false;
    }
    let word_count =
        text.split_whitespace().filter(|word| word.chars().any(|c| c.is_alphanumeric())).count();
    word_count >= MIN_WORD_COUNT_THRESHOLD
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("failed to initialize PDFium: {0}")]
    Initialization(String),
    #[error("failed to load PDF document: {0}")]
    Load(String),
    #[error("invalid page index: {0}")]
    InvalidPageIndex(u16),
    #[error("PDF render error: {0}")]
    Render(String),
    #[error("failed to save PDF: {0}")]
    Save(String),
}

pub type PdfResult<T> = Result<T, PdfError>;

/// Page dimensions in points (1/72 inch).
#[derive(Debug, Clone, Copy)]
pub struct PageDimensions {
    pub width: f32,
    pub height: f32,
}

/// A run of selectable text with its bounding box, in page coordinates
/// (origin top-left, matching the rest of this crate).
#[derive(Debug, Clone)]
pub struct TextBox {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Where a PDF link area points.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    Page(u16),
    Uri(String),
}

/// A clickable region on a page (spec.md §6: `Page::links()`).
#[derive(Debug, Clone)]
pub struct LinkArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub target: LinkTarget,
}

/// Render hints applied when rasterizing a PDF page into a backdrop.
#[derive(Debug, Clone, Copy)]
pub struct RenderHints {
    pub dpi: u32,
    pub antialiasing: bool,
    pub text_antialiasing: bool,
    pub text_hinting: bool,
}

impl Default for RenderHints {
    fn default() -> Self {
        Self { dpi: DEFAULT_RENDER_DPI, antialiasing: true, text_antialiasing: true, text_hinting: true }
    }
}

/// The engine's view of a PDF document: page geometry, rasterization, and
/// text/link extraction for selection and navigation. `canvas-render` never
/// depends on `canvas-cache` (see background.rs); callers own caching the
/// [`Pixmap`]s this trait produces.
pub trait PdfProvider {
    fn page_count(&self) -> u16;
    fn page_dimensions(&self, index: u16) -> PdfResult<PageDimensions>;
    fn render_to_image(&self, index: u16, hints: RenderHints) -> PdfResult<Pixmap>;
    fn text_boxes(&self, index: u16) -> PdfResult<Vec<TextBox>>;
    fn links(&self, index: u16) -> PdfResult<Vec<LinkArea>>;
    fn page_text(&self, index: u16) -> PdfResult<String>;
}

#[cfg(target_os = "windows")]
fn platform_library_filename() -> &'static str {
    "pdfium.dll"
}

#[cfg(target_os = "macos")]
fn platform_library_filename() -> &'static str {
    "libpdfium.dylib"
}

#[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
fn platform_library_filename() -> &'static str {
    "libpdfium.so"
}

fn push_pdfium_path_candidate(candidates: &mut Vec<std::path::PathBuf>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let path = Path::new(trimmed);
    let is_library_file =
        path.file_name().map(|name| name.to_string_lossy().eq_ignore_ascii_case(platform_library_filename())).unwrap_or(false);
    if is_library_file {
        candidates.push(path.to_path_buf());
    } else {
        candidates.push(path.join(platform_library_filename()));
    }
}

fn workspace_root_from_executable() -> Option<std::path::PathBuf> {
    let exe = env::current_exe().ok()?;
    let mut dir = exe.parent()?.to_path_buf();
    loop {
        if dir.join("Cargo.toml").exists() {
            return Some(dir);
        }
        let is_target_dir = dir.file_name().map(|name| name == "target").unwrap_or(false);
        if is_target_dir {
            let parent = dir.parent()?.to_path_buf();
            if parent.join("Cargo.toml").exists() {
                return Some(parent);
            }
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

fn candidate_pdfium_library_paths() -> Vec<std::path::PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(value) = env::var("SPEEDYNOTE_PDFIUM_LIB") {
        push_pdfium_path_candidate(&mut candidates, &value);
    }
    if let Ok(value) = env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        push_pdfium_path_candidate(&mut candidates, &value);
    }
    if let Ok(value) = env::var("DYLD_LIBRARY_PATH") {
        for entry in env::split_paths(&value) {
            candidates.push(entry.join(platform_library_filename()));
        }
    }
    if let Ok(value) = env::var("LD_LIBRARY_PATH") {
        for entry in env::split_paths(&value) {
            candidates.push(entry.join(platform_library_filename()));
        }
    }

    if let Ok(exe_path) = env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(Pdfium::pdfium_platform_library_name_at_path(exe_dir));
            #[cfg(target_os = "macos")]
            {
                candidates.push(exe_dir.join("../Frameworks").join(platform_library_filename()));
            }
        }
    }

    if let Ok(cwd) = env::current_dir() {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(&cwd));
    }

    if let Some(workspace_root) = workspace_root_from_executable() {
        let third_party_root = workspace_root.join("third_party").join("pdfium");
        candidates.push(third_party_root.join(platform_library_filename()));
        candidates.push(
            third_party_root
                .join(format!("{}-{}", env::consts::OS, env::consts::ARCH))
                .join(platform_library_filename()),
        );
        candidates.push(
            third_party_root
                .join(format!("{}-{}", env::consts::OS, env::consts::ARCH))
                .join("lib")
                .join(platform_library_filename()),
        );
        if let Ok(entries) = std::fs::read_dir(&third_party_root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                candidates.push(path.join(platform_library_filename()));
                candidates.push(path.join("lib").join(platform_library_filename()));
            }
        }
    }

    candidates
}

fn init_pdfium() -> PdfResult<Pdfium> {
    for candidate in candidate_pdfium_library_paths() {
        if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library().map(Pdfium::new).map_err(|system_err| {
        let hint = format!(
            "Unable to locate {}. Set SPEEDYNOTE_PDFIUM_LIB to the library path.",
            platform_library_filename()
        );
        PdfError::Initialization(format!("{hint}\nSystem loader error: {system_err}"))
    })
}

fn get_pdfium() -> PdfResult<&'static Pdfium> {
    PDFIUM.with(|cell| {
        if let Some(pdfium) = cell.get() {
            return Ok(*pdfium);
        }
        let pdfium = init_pdfium()?;
        let pdfium_static: &'static Pdfium = Box::leak(Box::new(pdfium));
        let _ = cell.set(pdfium_static);
        Ok(pdfium_static)
    })
}

fn operation_lock() -> &'static Mutex<()> {
    PDFIUM_OPERATION_LOCK.get_or_init(|| Mutex::new(()))
}

/// Pre-initialize PDFium. Call early in application startup to move its
/// cost off the first page render.
pub fn init_pdfium_global() -> PdfResult<()> {
    get_pdfium()?;
    Ok(())
}

/// [`PdfProvider`] backed by `pdfium-render`.
pub struct PdfiumProvider {
    document: pdfium_render::prelude::PdfDocument<'static>,
}

impl PdfiumProvider {
    pub fn open<P: AsRef<Path>>(path: P) -> PdfResult<Self> {
        let pdfium = get_pdfium()?;
        let document =
            pdfium.load_pdf_from_file(path.as_ref(), None).map_err(|e| PdfError::Load(e.to_string()))?;
        Ok(Self { document })
    }

    pub fn from_bytes(data: Vec<u8>) -> PdfResult<Self> {
        let pdfium = get_pdfium()?;
        let data_static: &'static [u8] = Box::leak(data.into_boxed_slice());
        let document = pdfium
            .load_pdf_from_byte_slice(data_static, None)
            .map_err(|e| PdfError::Load(e.to_string()))?;
        Ok(Self { document })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> PdfResult<()> {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.document.save_to_file(path.as_ref()).map_err(|e| PdfError::Save(e.to_string()))
    }

    fn get_page(&self, index: u16) -> PdfResult<PdfPage<'_>> {
        self.document.pages().get(index).map_err(|_| PdfError::InvalidPageIndex(index))
    }
}

impl PdfProvider for PdfiumProvider {
    fn page_count(&self) -> u16 {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.document.pages().len()
    }

    fn page_dimensions(&self, index: u16) -> PdfResult<PageDimensions> {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let page = self.get_page(index)?;
        Ok(PageDimensions { width: page.width().value, height: page.height().value })
    }

    fn render_to_image(&self, index: u16, hints: RenderHints) -> PdfResult<Pixmap> {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let page = self.get_page(index)?;

        let scale = hints.dpi as f32 / 72.0;
        let target_width = (page.width().value * scale).round().max(1.0) as i32;
        let target_height = (page.height().value * scale).round().max(1.0) as i32;

        let config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_target_height(target_height)
            .use_smoothing_antialiasing(hints.antialiasing)
            .use_text_antialiasing(hints.text_antialiasing)
            .use_grayscale_text_rendering(!hints.text_hinting);

        let bitmap = page.render_with_config(&config).map_err(|e| PdfError::Render(e.to_string()))?;
        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        Ok(Pixmap::from_pixels(width, height, bitmap.as_rgba_bytes().to_vec()))
    }

    fn text_boxes(&self, index: u16) -> PdfResult<Vec<TextBox>> {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let page = self.get_page(index)?;
        let page_height = page.height().value;

        let text_page =
            page.text().map_err(|e| PdfError::Render(format!("failed to get text page: {e}")))?;

        let mut spans = Vec::new();
        let mut current_text = String::new();
        let mut span_start_x: Option<f32> = None;
        let mut span_min_y: Option<f32> = None;
        let mut span_max_y: Option<f32> = None;
        let mut span_max_x = 0.0f32;

        let flush = |spans: &mut Vec<TextBox>,
                     current_text: &mut String,
                     start_x: Option<f32>,
                     min_y: Option<f32>,
                     max_y: Option<f32>,
                     max_x: f32| {
            if let (false, Some(start_x), Some(min_y), Some(max_y)) = (current_text.is_empty(), start_x, min_y, max_y) {
                spans.push(TextBox {
                    text: current_text.clone(),
                    x: start_x,
                    y: min_y,
                    width: max_x - start_x,
                    height: max_y - min_y,
                });
            }
            current_text.clear();
        };

        for char_result in text_page.chars().iter() {
            let c = match char_result.unicode_char() {
                Some(ch) => ch,
                None => continue,
            };
            let loose_bounds = match char_result.loose_bounds() {
                Ok(bounds) => bounds,
                Err(_) => continue,
            };

            let char_x = loose_bounds.left().value;
            let char_y = page_height - loose_bounds.top().value;
            let char_width = loose_bounds.right().value - loose_bounds.left().value;
            let char_height = loose_bounds.top().value - loose_bounds.bottom().value;

            if c.is_whitespace() {
                flush(&mut spans, &mut current_text, span_start_x, span_min_y, span_max_y, span_max_x);
                span_start_x = None;
                span_min_y = None;
                span_max_y = None;
                span_max_x = 0.0;
            } else {
                current_text.push(c);
                match span_start_x {
                    None => {
                        span_start_x = Some(char_x);
                        span_min_y = Some(char_y);
                        span_max_y = Some(char_y + char_height);
                    }
                    Some(_) => {
                        span_min_y = span_min_y.map(|y| y.min(char_y));
                        span_max_y = span_max_y.map(|y| y.max(char_y + char_height));
                    }
                }
                span_max_x = span_max_x.max(char_x + char_width);
            }
        }
        flush(&mut spans, &mut current_text, span_start_x, span_min_y, span_max_y, span_max_x);

        Ok(spans)
    }

    fn links(&self, index: u16) -> PdfResult<Vec<LinkArea>> {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let page = self.get_page(index)?;
        let page_height = page.height().value;

        let mut areas = Vec::new();
        for link in page.links().iter() {
            let Ok(bounds) = link.bounds() else { continue };
            let target = match link.action() {
                Some(PdfAction::GoToDestination(dest)) => match dest.destination().page_index() {
                    Ok(page_index) => LinkTarget::Page(page_index),
                    Err(_) => continue,
                },
                Some(PdfAction::RemoteGoToDestination(_)) => continue,
                Some(PdfAction::UnsupportedActionType(_)) | None => continue,
                Some(PdfAction::Uri(uri)) => LinkTarget::Uri(uri.uri().unwrap_or_default()),
                Some(PdfAction::Launch(_)) => continue,
                Some(PdfAction::EmbeddedGoTo(_)) => continue,
            };

            areas.push(LinkArea {
                x: bounds.left().value,
                y: page_height - bounds.top().value,
                width: bounds.right().value - bounds.left().value,
                height: bounds.top().value - bounds.bottom().value,
                target,
            });
        }
        Ok(areas)
    }

    fn page_text(&self, index: u16) -> PdfResult<String> {
        let _guard = operation_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let page = self.get_page(index)?;
        let text = page
            .text()
            .map_err(|e| PdfError::Render(format!("failed to extract text: {e}")))?
            .all()
            .to_string();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sufficient_text_requires_both_length_and_word_count() {
        assert!(!has_sufficient_text(""));
        assert!(!has_sufficient_text("   \n "));
        assert!(!has_sufficient_text("Page 1"));
        assert!(!has_sufficient_text("one two three four five six seven eight nine"));
        let enough = "This is a document with sufficient text content that should not need OCR.";
        assert!(has_sufficient_text(enough));
    }

    #[test]
    fn push_pdfium_path_candidate_appends_library_filename_for_directory() {
        let mut candidates = Vec::new();
        push_pdfium_path_candidate(&mut candidates, "/tmp/pdfium");
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].to_string_lossy().contains(platform_library_filename()));
    }

    #[test]
    fn push_pdfium_path_candidate_keeps_exact_library_file() {
        let mut candidates = Vec::new();
        #[cfg(target_os = "windows")]
        let path = r"C:\pdfium\pdfium.dll";
        #[cfg(not(target_os = "windows"))]
        let path = "/tmp/libpdfium.dylib";

        push_pdfium_path_candidate(&mut candidates, path);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], Path::new(path));
    }

    #[test]
    fn pdf_error_messages_are_descriptive() {
        let err = PdfError::InvalidPageIndex(5);
        assert_eq!(err.to_string(), "invalid page index: 5");
        let err = PdfError::Load("file not found".to_string());
        assert!(err.to_string().contains("file not found"));
    }
}
