//! Top-level glue tying the Document model to the two named Page Caches
//! (spec.md §4.F) and the shared worker pool that services their prefetch
//! jobs. Doubles a single cache-plus-scheduler wiring into the
//! PDF-cache/Note-cache pair.

use std::path::Path;
use std::sync::{Arc, Mutex};

use speedynote_canvas_cache::{CacheStats, PageCache, PageCacheConfig, PageRenderer};
use speedynote_canvas_render::{Pixmap, PdfiumProvider};
use speedynote_canvas_scheduler::{CacheKind, Job, JobScheduler, JobType, WorkerPool, WorkerPoolConfig};

use crate::config::CanvasConfig;
use crate::document::Document;
use crate::error::CanvasResult;
use crate::events::EngineEvent;

/// Open a PDF file and report `PdfLoaded` to the host (spec.md §6).
pub fn load_pdf<P: AsRef<Path>>(path: P) -> CanvasResult<(PdfiumProvider, EngineEvent)> {
    let provider = PdfiumProvider::open(path)?;
    Ok((provider, EngineEvent::PdfLoaded))
}

/// Renders a page's combined image (the page stacked on its successor) for
/// one of the two named caches. The document owner supplies one of these
/// per cache; `Note` composes the ink buffer, `Pdf` composes the backdrop.
pub trait CombinedPageSource: Send + Sync {
    fn render_combined(&self, page_index: u32) -> Result<Pixmap, String>;
}

struct SourceRenderer<S: CombinedPageSource>(S);

impl<S: CombinedPageSource> PageRenderer for SourceRenderer<S> {
    fn render_page(&self, page_index: u32) -> Result<Pixmap, String> {
        self.0.render_combined(page_index)
    }
}

/// Owns the document, its two page caches, and the worker pool that drains
/// prefetch jobs submitted by either cache's debounce timer.
pub struct CanvasEngine<P: CombinedPageSource + 'static, N: CombinedPageSource + 'static> {
    pub document: Arc<Mutex<Document>>,
    pdf_cache: Arc<PageCache<SourceRenderer<P>>>,
    note_cache: Arc<PageCache<SourceRenderer<N>>>,
    worker_pool: Option<WorkerPool>,
}

impl<P: CombinedPageSource + 'static, N: CombinedPageSource + 'static> CanvasEngine<P, N> {
    pub fn new(document: Document, pdf_source: P, note_source: N, config: &CanvasConfig) -> Self {
        let scheduler = Arc::new(JobScheduler::new());
        let cache_config = PageCacheConfig { capacity: config.cache_capacity, debounce: config.prefetch_debounce };

        let pdf_cache = Arc::new(PageCache::new(
            CacheKind::Pdf,
            Arc::new(SourceRenderer(pdf_source)),
            scheduler.clone(),
            cache_config,
        ));
        let note_cache = Arc::new(PageCache::new(
            CacheKind::Note,
            Arc::new(SourceRenderer(note_source)),
            scheduler.clone(),
            cache_config,
        ));

        let worker_pool = start_worker_pool(scheduler, pdf_cache.clone(), note_cache.clone());

        Self { document: Arc::new(Mutex::new(document)), pdf_cache, note_cache, worker_pool: Some(worker_pool) }
    }

    pub fn pdf_cache(&self) -> &PageCache<SourceRenderer<P>> {
        &self.pdf_cache
    }

    pub fn note_cache(&self) -> &PageCache<SourceRenderer<N>> {
        &self.note_cache
    }

    pub fn pdf_stats(&self) -> CacheStats {
        self.pdf_cache.stats()
    }

    pub fn note_stats(&self) -> CacheStats {
        self.note_cache.stats()
    }

    /// Edits invalidate only the edited page's note-cache entry (spec.md
    /// Invariant 3); the PDF-cache entry is untouched since PDF content
    /// never changes from ink edits.
    pub fn invalidate_after_edit(&self, page_index: u32) {
        self.note_cache.invalidate(page_index);
    }

    /// Page-switch invalidation, clearing the neighborhood on both caches.
    pub fn invalidate_neighborhood_on_page_switch(&self, page_index: u32) {
        self.pdf_cache.invalidate_neighborhood(page_index);
        self.note_cache.invalidate_neighborhood(page_index);
    }

    /// Reinsert a freshly-rendered page after a successful save (spec.md
    /// §4.F: "reinsert-on-save").
    pub fn reinsert_after_save(&self, page_index: u32, pixmap: Pixmap) {
        self.note_cache.insert(page_index, pixmap);
    }

    pub fn shutdown(mut self) {
        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown();
        }
    }
}

fn start_worker_pool<P: CombinedPageSource + 'static, N: CombinedPageSource + 'static>(
    scheduler: Arc<JobScheduler>,
    pdf_cache: Arc<PageCache<SourceRenderer<P>>>,
    note_cache: Arc<PageCache<SourceRenderer<N>>>,
) -> WorkerPool {
    let executor = Arc::new(move |job: &Job, _token: &speedynote_canvas_scheduler::CancellationToken| {
        match job.job_type {
            JobType::RenderPage { cache: CacheKind::Pdf, page_index } => pdf_cache.execute_prefetch(page_index),
            JobType::RenderPage { cache: CacheKind::Note, page_index } => note_cache.execute_prefetch(page_index),
            JobType::ExportDocument => {
                tracing::debug!("export job reached the worker pool with no registered handler");
            }
        }
    });

    WorkerPool::new(scheduler, executor, WorkerPoolConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMode;
    use std::path::PathBuf;
    use std::time::Duration;

    struct ConstantSource;

    impl CombinedPageSource for ConstantSource {
        fn render_combined(&self, _page_index: u32) -> Result<Pixmap, String> {
            Ok(Pixmap::new(4, 4))
        }
    }

    #[test]
    fn engine_wires_both_caches_and_services_prefetch_jobs() {
        let document = Document::new(PathBuf::from("/tmp/engine-test"), crate::document::DocumentMetadata::new(DocumentMode::Paged));
        let config = CanvasConfig { prefetch_debounce: Duration::from_millis(10), ..Default::default() };
        let engine = CanvasEngine::new(document, ConstantSource, ConstantSource, &config);

        engine.pdf_cache().get_or_render_current(0).unwrap();
        std::thread::sleep(Duration::from_millis(150));

        assert!(engine.pdf_cache().contains(1));
        engine.shutdown();
    }

    #[test]
    fn invalidate_after_edit_only_touches_note_cache() {
        let document = Document::new(PathBuf::from("/tmp/engine-test-2"), crate::document::DocumentMetadata::new(DocumentMode::Paged));
        let config = CanvasConfig::default();
        let engine = CanvasEngine::new(document, ConstantSource, ConstantSource, &config);

        engine.pdf_cache().insert(2, Pixmap::new(2, 2));
        engine.note_cache().insert(2, Pixmap::new(2, 2));
        engine.invalidate_after_edit(2);

        assert!(engine.pdf_cache().contains(2));
        assert!(!engine.note_cache().contains(2));
        engine.shutdown();
    }
}
