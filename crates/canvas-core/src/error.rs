//! Error types surfaced by the canvas core.

use speedynote_canvas_render::PdfError;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to (de)serialize metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pdf error: {0}")]
    Pdf(#[from] PdfError),

    #[error("bundle is corrupt and has no legacy fallback: {0}")]
    BundleCorrupt(String),
}

pub type CanvasResult<T> = Result<T, CanvasError>;
