//! Priority-based job queue.
//!
//! Jobs are executed in priority order, with FIFO ordering within a
//! priority level.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

/// Job priority levels. Higher numeric values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Background export/merge work (annotated PDF export, combined-canvas
    /// save splitting) that can yield to anything page-facing.
    Background = 0,
    /// Adjacent-page prefetch triggered by the Page Cache's debounce timer
    /// (spec.md §4.F).
    Adjacent = 1,
}

pub type JobId = u64;

/// Which named cache a job's render targets (spec.md §4.F: two independent
/// LRU caches, PDF-backed and note-backed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Pdf,
    Note,
}

/// Job type enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    /// Render (or re-render) the combined image for a page into a named cache.
    RenderPage { cache: CacheKind, page_index: u32 },
    /// Re-export the document's annotated PDF / combined-canvas save.
    ExportDocument,
}

/// A scheduled job with priority.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub job_type: JobType,
    insertion_order: u64,
}

impl Job {
    pub fn new(id: JobId, priority: JobPriority, job_type: JobType, insertion_order: u64) -> Self {
        Self { id, priority, job_type, insertion_order }
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

/// Thread-safe priority queue of jobs.
pub struct PriorityQueue {
    state: Arc<Mutex<QueueState>>,
}

struct QueueState {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    insertion_counter: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_job_id: 1,
                insertion_counter: 0,
            })),
        }
    }

    pub fn push(&self, priority: JobPriority, job_type: JobType) -> JobId {
        let mut state = self.state.lock().unwrap();
        let job_id = state.next_job_id;
        state.next_job_id += 1;
        let insertion_order = state.insertion_counter;
        state.insertion_counter += 1;

        state.heap.push(Job::new(job_id, priority, job_type, insertion_order));
        job_id
    }

    pub fn pop(&self) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        state.heap.pop()
    }

    pub fn peek(&self) -> Option<Job> {
        let state = self.state.lock().unwrap();
        state.heap.peek().cloned()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.heap.is_empty()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.heap.clear();
    }

    /// Remove all jobs matching `predicate`. Returns the number removed.
    pub fn remove_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        let mut state = self.state.lock().unwrap();
        let original_len = state.heap.len();

        let mut remaining = Vec::new();
        while let Some(job) = state.heap.pop() {
            if !predicate(&job) {
                remaining.push(job);
            }
        }
        state.heap = remaining.into_iter().collect();

        original_len - state.heap.len()
    }

    /// Jobs currently queued, in arbitrary (non-priority) order.
    pub fn jobs(&self) -> Vec<Job> {
        let state = self.state.lock().unwrap();
        state.heap.iter().cloned().collect()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_puts_adjacent_before_background() {
        assert!(JobPriority::Adjacent > JobPriority::Background);
    }

    #[test]
    fn pop_returns_highest_priority_first() {
        let queue = PriorityQueue::new();
        queue.push(JobPriority::Background, JobType::ExportDocument);
        queue.push(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 3 });

        assert_eq!(queue.pop().unwrap().priority, JobPriority::Adjacent);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Background);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn fifo_within_same_priority() {
        let queue = PriorityQueue::new();
        let id1 = queue.push(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Note, page_index: 1 });
        let id2 = queue.push(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Note, page_index: 2 });

        assert_eq!(queue.pop().unwrap().id, id1);
        assert_eq!(queue.pop().unwrap().id, id2);
    }

    #[test]
    fn remove_if_removes_jobs_for_a_page() {
        let queue = PriorityQueue::new();
        queue.push(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 5 });
        queue.push(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 6 });

        let removed = queue.remove_if(|job| matches!(job.job_type, JobType::RenderPage { page_index: 5, .. }));
        assert_eq!(removed, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = PriorityQueue::new();
        queue.push(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 0 });
        queue.clear();
        assert!(queue.is_empty());
    }
}
