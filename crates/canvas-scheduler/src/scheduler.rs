//! High-level job scheduler: submission, priority-ordered dispatch, and
//! job lifecycle (completion / cancellation).

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{Job, JobId, JobPriority, JobType, PriorityQueue};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    pub queue_size: usize,
}

impl SchedulerStats {
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted - self.jobs_completed - self.jobs_cancelled
    }
}

/// Thread-safe job scheduler. Jobs are dequeued in priority order; within a
/// priority level, FIFO. Each submitted job gets a [`CancellationToken`]
/// that workers check cooperatively.
pub struct JobScheduler {
    queue: PriorityQueue,
    state: Arc<Mutex<SchedulerState>>,
    cancellation: CancellationRegistry,
}

struct SchedulerState {
    stats: SchedulerStats,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            state: Arc::new(Mutex::new(SchedulerState { stats: SchedulerStats::default() })),
            cancellation: CancellationRegistry::new(),
        }
    }

    /// Submit a job. Returns its id and cancellation token.
    pub fn submit(&self, priority: JobPriority, job_type: JobType) -> (JobId, CancellationToken) {
        let job_id = self.queue.push(priority, job_type);
        let token = self.cancellation.register(job_id);

        let mut state = self.state.lock().unwrap();
        state.stats.jobs_submitted += 1;

        (job_id, token)
    }

    /// Pop the highest priority job, or `None` if the queue is empty.
    pub fn next_job(&self) -> Option<Job> {
        self.queue.pop()
    }

    pub fn complete_job(&self, job_id: JobId) {
        let mut state = self.state.lock().unwrap();
        state.stats.jobs_completed += 1;
        drop(state);
        self.cancellation.unregister(job_id);
    }

    /// Cancel a job by id, whether queued or already running (workers must
    /// check the token cooperatively). Returns `true` if the job was known.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let token_cancelled = self.cancellation.cancel(job_id);
        let removed = self.queue.remove_if(|job| job.id == job_id);

        if removed > 0 {
            let mut state = self.state.lock().unwrap();
            state.stats.jobs_cancelled += removed as u64;
            drop(state);
            self.cancellation.unregister(job_id);
            true
        } else {
            token_cancelled
        }
    }

    /// Cancel and dequeue all jobs matching `predicate`. Returns the count removed.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        let jobs_to_cancel: Vec<JobId> =
            self.queue.jobs().into_iter().filter(|job| predicate(job)).map(|job| job.id).collect();

        self.cancellation.cancel_many(&jobs_to_cancel);
        let removed = self.queue.remove_if(predicate);

        if removed > 0 {
            let mut state = self.state.lock().unwrap();
            state.stats.jobs_cancelled += removed as u64;
            drop(state);
            for job_id in jobs_to_cancel {
                self.cancellation.unregister(job_id);
            }
        }

        removed
    }

    /// Cancel all jobs targeting a specific page. Used when the user
    /// navigates away before a prefetch completes (spec.md §4.F).
    pub fn cancel_page_jobs(&self, page_index: u32) -> usize {
        self.cancel_jobs_if(|job| match &job.job_type {
            JobType::RenderPage { page_index: pi, .. } => *pi == page_index,
            JobType::ExportDocument => false,
        })
    }

    pub fn cancel_all_except<F>(&self, keep_predicate: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        self.cancel_jobs_if(|job| !keep_predicate(job))
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Cancel and drop every pending job.
    pub fn clear(&self) {
        let cancelled = self.queue.len();
        self.cancellation.cancel_all();
        self.queue.clear();

        if cancelled > 0 {
            let mut state = self.state.lock().unwrap();
            state.stats.jobs_cancelled += cancelled as u64;
            drop(state);
            self.cancellation.clear();
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().unwrap();
        let mut stats = state.stats.clone();
        stats.queue_size = self.queue.len();
        stats
    }

    pub fn peek_next_job(&self) -> Option<Job> {
        self.queue.peek()
    }

    pub fn pending_jobs_list(&self) -> Vec<Job> {
        self.queue.jobs()
    }

    /// Token for a job, if it is still queued or running.
    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::CacheKind;

    #[test]
    fn submit_then_next_job_round_trips() {
        let scheduler = JobScheduler::new();
        let (job_id, _token) =
            scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 2 });

        let job = scheduler.next_job().unwrap();
        assert_eq!(job.id, job_id);
        assert!(scheduler.next_job().is_none());
    }

    #[test]
    fn cancel_job_removes_from_queue_and_flags_token() {
        let scheduler = JobScheduler::new();
        let (job_id, token) =
            scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Note, page_index: 1 });

        assert!(scheduler.cancel_job(job_id));
        assert!(token.is_cancelled());
        assert!(scheduler.next_job().is_none());
    }

    #[test]
    fn cancel_page_jobs_only_targets_matching_page() {
        let scheduler = JobScheduler::new();
        scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 5 });
        scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 6 });

        let cancelled = scheduler.cancel_page_jobs(5);
        assert_eq!(cancelled, 1);
        assert_eq!(scheduler.pending_jobs(), 1);
    }

    #[test]
    fn stats_track_submission_completion_and_cancellation() {
        let scheduler = JobScheduler::new();
        let (job_id, _) =
            scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 0 });
        scheduler.complete_job(job_id);

        let stats = scheduler.stats();
        assert_eq!(stats.jobs_submitted, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.pending_jobs(), 0);
    }

    #[test]
    fn clear_cancels_every_pending_job() {
        let scheduler = JobScheduler::new();
        let (_, token1) =
            scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 0 });
        let (_, token2) =
            scheduler.submit(JobPriority::Background, JobType::ExportDocument);

        scheduler.clear();
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
        assert!(!scheduler.has_pending_jobs());
    }
}
