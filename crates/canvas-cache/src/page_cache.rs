//! LRU cache of combined page images, with debounced neighbor prefetch.
//!
//! A capacity-by-entry-count LRU (with hit/miss/eviction counters) of whole
//! combined page images, since spec.md §4.F caps each cache at a fixed
//! number of entries (`K = 6`), not a memory budget.

use speedynote_canvas_render::Pixmap;
use speedynote_canvas_scheduler::{CacheKind, JobPriority, JobScheduler, JobType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to render page {page_index}: {message}")]
    Render { page_index: u32, message: String },
}

/// A page render callback supplied by the owner of the cache (the Document);
/// produces the *combined* image (page N stacked on N+1) for a page index.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, page_index: u32) -> Result<Pixmap, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub page_count: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageCacheConfig {
    /// Maximum entries held at once (spec.md §4.F: `K = 6`).
    pub capacity: usize,
    /// How long the current page must stay still before neighbors are prefetched.
    pub debounce: Duration,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self { capacity: 6, debounce: Duration::from_secs(1) }
    }
}

struct State {
    pages: HashMap<u32, Pixmap>,
    lru_queue: VecDeque<u32>,
    in_flight: HashSet<u32>,
    stats: CacheStats,
}

impl State {
    fn touch(&mut self, key: u32) {
        self.lru_queue.retain(|&k| k != key);
        self.lru_queue.push_back(key);
    }

    fn evict_lru_if_over_capacity(&mut self, capacity: usize) {
        while self.pages.len() > capacity {
            let Some(key) = self.lru_queue.pop_front() else { break };
            if self.pages.remove(&key).is_some() {
                self.stats.evictions += 1;
            }
        }
    }
}

/// One named LRU page cache (either the PDF-backed or note-backed instance).
pub struct PageCache<R: PageRenderer> {
    kind: CacheKind,
    config: PageCacheConfig,
    renderer: Arc<R>,
    scheduler: Arc<JobScheduler>,
    state: Arc<Mutex<State>>,
    debounce_generation: Arc<AtomicU64>,
}

impl<R: PageRenderer + 'static> PageCache<R> {
    pub fn new(kind: CacheKind, renderer: Arc<R>, scheduler: Arc<JobScheduler>, config: PageCacheConfig) -> Self {
        Self {
            kind,
            config,
            renderer,
            scheduler,
            state: Arc::new(Mutex::new(State {
                pages: HashMap::new(),
                lru_queue: VecDeque::new(),
                in_flight: HashSet::new(),
                stats: CacheStats { capacity: config.capacity, ..Default::default() },
            })),
            debounce_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fetch the combined image for `page_index`, rendering synchronously on
    /// a miss (spec.md §4.F: "synchronous render-on-miss for the current
    /// page"). Also arms the debounce timer that, after it elapses
    /// unperturbed, submits prefetch jobs for `page_index - 1`, `+1`, `+2`.
    pub fn get_or_render_current(&self, page_index: u32) -> Result<Pixmap, CacheError> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(pixmap) = state.pages.get(&page_index).cloned() {
                state.touch(page_index);
                state.stats.hits += 1;
                drop(state);
                self.arm_prefetch(page_index);
                return Ok(pixmap);
            }
            state.stats.misses += 1;
        }

        let pixmap = self
            .renderer
            .render_page(page_index)
            .map_err(|message| CacheError::Render { page_index, message })?;
        self.insert(page_index, pixmap.clone());
        self.arm_prefetch(page_index);
        Ok(pixmap)
    }

    /// Insert (or overwrite) an entry directly, evicting if over capacity.
    /// Used for prefetch completion and for reinsert-on-save (spec.md §4.F).
    pub fn insert(&self, page_index: u32, pixmap: Pixmap) {
        let mut state = self.state.lock().unwrap();
        state.pages.insert(page_index, pixmap);
        state.touch(page_index);
        state.in_flight.remove(&page_index);
        let capacity = self.config.capacity;
        state.evict_lru_if_over_capacity(capacity);
        state.stats.page_count = state.pages.len();
    }

    /// Remove a single page's cached entry (spec.md Invariant 3: edits
    /// invalidate only the edited page's cache entry).
    pub fn invalidate(&self, page_index: u32) {
        let mut state = self.state.lock().unwrap();
        state.pages.remove(&page_index);
        state.lru_queue.retain(|&k| k != page_index);
        state.stats.page_count = state.pages.len();
    }

    /// Remove `page_index - 1`, `page_index`, and `page_index + 1`, clearing
    /// the whole neighborhood around a page switch in one call.
    pub fn invalidate_neighborhood(&self, page_index: u32) {
        self.invalidate(page_index);
        if page_index > 0 {
            self.invalidate(page_index - 1);
        }
        self.invalidate(page_index + 1);
    }

    pub fn contains(&self, page_index: u32) -> bool {
        let state = self.state.lock().unwrap();
        state.pages.contains_key(&page_index)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        state.stats
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Schedule adjacent-page prefetch jobs after the debounce window,
    /// coalescing with any still-pending timer (spec.md §4.F: "1s debounce
    /// before prefetching N-1/N+1/N+2; in-flight coalescing").
    fn arm_prefetch(&self, current_page: u32) {
        let my_generation = self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.debounce_generation.clone();
        let debounce = self.config.debounce;
        let state = self.state.clone();
        let scheduler = self.scheduler.clone();
        let kind = self.kind;

        std::thread::spawn(move || {
            std::thread::sleep(debounce);
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }

            let neighbors: [Option<u32>; 3] =
                [current_page.checked_sub(1), Some(current_page + 1), Some(current_page + 2)];

            for neighbor in neighbors.into_iter().flatten() {
                let mut state = state.lock().unwrap();
                if state.pages.contains_key(&neighbor) || state.in_flight.contains(&neighbor) {
                    continue;
                }
                state.in_flight.insert(neighbor);
                drop(state);

                scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: kind, page_index: neighbor });
            }
        });
    }

    /// Execute a prefetch job: render `page_index` and insert it. Intended
    /// to be called from the [`speedynote_canvas_scheduler::WorkerPool`]
    /// executor wired up by the document layer.
    pub fn execute_prefetch(&self, page_index: u32) {
        if self.contains(page_index) {
            let mut state = self.state.lock().unwrap();
            state.in_flight.remove(&page_index);
            return;
        }

        match self.renderer.render_page(page_index) {
            Ok(pixmap) => self.insert(page_index, pixmap),
            Err(_) => {
                let mut state = self.state.lock().unwrap();
                state.in_flight.remove(&page_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRenderer {
        renders: AtomicUsize,
        fail_pages: Mutex<HashSet<u32>>,
    }

    impl CountingRenderer {
        fn new() -> Self {
            Self { renders: AtomicUsize::new(0), fail_pages: Mutex::new(HashSet::new()) }
        }
    }

    impl PageRenderer for CountingRenderer {
        fn render_page(&self, page_index: u32) -> Result<Pixmap, String> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if self.fail_pages.lock().unwrap().contains(&page_index) {
                return Err(format!("boom on page {page_index}"));
            }
            Ok(Pixmap::new(4, 4))
        }
    }

    fn make_cache(capacity: usize) -> PageCache<CountingRenderer> {
        let renderer = Arc::new(CountingRenderer::new());
        let scheduler = Arc::new(JobScheduler::new());
        let config = PageCacheConfig { capacity, debounce: Duration::from_secs(60) };
        PageCache::new(CacheKind::Pdf, renderer, scheduler, config)
    }

    #[test]
    fn miss_renders_synchronously_and_counts_as_miss() {
        let cache = make_cache(6);
        let result = cache.get_or_render_current(0);
        assert!(result.is_ok());
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn hit_does_not_re_render() {
        let cache = make_cache(6);
        cache.get_or_render_current(2).unwrap();
        cache.get_or_render_current(2).unwrap();
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = make_cache(2);
        cache.insert(0, Pixmap::new(2, 2));
        cache.insert(1, Pixmap::new(2, 2));
        cache.insert(2, Pixmap::new(2, 2));

        assert!(!cache.contains(0));
        assert!(cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn invalidate_removes_only_the_given_page() {
        let cache = make_cache(6);
        cache.insert(0, Pixmap::new(2, 2));
        cache.insert(1, Pixmap::new(2, 2));

        cache.invalidate(0);
        assert!(!cache.contains(0));
        assert!(cache.contains(1));
    }

    #[test]
    fn invalidate_neighborhood_clears_page_and_both_neighbors() {
        let cache = make_cache(6);
        cache.insert(0, Pixmap::new(2, 2));
        cache.insert(1, Pixmap::new(2, 2));
        cache.insert(2, Pixmap::new(2, 2));
        cache.insert(3, Pixmap::new(2, 2));

        cache.invalidate_neighborhood(1);
        assert!(!cache.contains(0));
        assert!(!cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn invalidate_neighborhood_does_not_underflow_at_page_zero() {
        let cache = make_cache(6);
        cache.insert(0, Pixmap::new(2, 2));
        cache.invalidate_neighborhood(0);
        assert!(!cache.contains(0));
    }

    #[test]
    fn reinsert_after_save_makes_page_a_hit() {
        let cache = make_cache(6);
        cache.insert(5, Pixmap::new(3, 3));
        let result = cache.get_or_render_current(5).unwrap();
        assert_eq!(result.width, 3);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn execute_prefetch_inserts_render_result() {
        let cache = make_cache(6);
        cache.execute_prefetch(7);
        assert!(cache.contains(7));
    }

    #[test]
    fn execute_prefetch_skips_already_cached_page() {
        let renderer = Arc::new(CountingRenderer::new());
        let scheduler = Arc::new(JobScheduler::new());
        let cache = PageCache::new(
            CacheKind::Note,
            renderer.clone(),
            scheduler,
            PageCacheConfig { capacity: 6, debounce: Duration::from_secs(60) },
        );
        cache.insert(1, Pixmap::new(2, 2));
        let renders_before = renderer.renders.load(Ordering::SeqCst);
        cache.execute_prefetch(1);
        assert_eq!(renderer.renders.load(Ordering::SeqCst), renders_before);
    }

    #[test]
    fn debounced_prefetch_submits_jobs_for_three_neighbors() {
        let cache = make_cache(6);
        let scheduler = cache.scheduler.clone();
        // Re-create with a short debounce for this test.
        let renderer = Arc::new(CountingRenderer::new());
        let cache = PageCache::new(
            CacheKind::Pdf,
            renderer,
            scheduler.clone(),
            PageCacheConfig { capacity: 6, debounce: Duration::from_millis(20) },
        );

        cache.get_or_render_current(10).unwrap();
        std::thread::sleep(Duration::from_millis(80));

        let pending: Vec<_> = scheduler.pending_jobs_list();
        assert_eq!(pending.len(), 3);
    }
}
