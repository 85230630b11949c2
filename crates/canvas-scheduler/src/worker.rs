//! Worker pool that pulls jobs from a [`JobScheduler`] and executes them on
//! dedicated threads.

use crate::{CancellationToken, Job, JobScheduler};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked by a worker for each job it pulls. Should check
/// `token.is_cancelled()` periodically and return early if cancelled.
pub type JobExecutor = Arc<dyn Fn(&Job, &CancellationToken) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. Default: number of logical CPU cores.
    pub num_workers: usize,
    /// How long a worker sleeps between empty polls. Default 100ms.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { num_workers: num_cpus(), poll_interval: Duration::from_millis(100) }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers, poll_interval: Duration::from_millis(100) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Pool of worker threads executing jobs from a [`JobScheduler`] in parallel.
pub struct WorkerPool {
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(scheduler: Arc<JobScheduler>, executor: JobExecutor, config: WorkerPoolConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            workers.push(Worker::new(
                id,
                scheduler.clone(),
                executor.clone(),
                shutdown.clone(),
                config.poll_interval,
            ));
        }

        Self { workers, shutdown }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Signal shutdown and block until every worker thread exits.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers {
            worker.join();
        }
    }

    /// Signal shutdown without waiting for workers to exit.
    pub fn shutdown_nowait(self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        id: usize,
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        let thread = thread::Builder::new()
            .name(format!("canvas-worker-{id}"))
            .spawn(move || {
                Self::run(scheduler, executor, shutdown, poll_interval);
            })
            .expect("failed to spawn worker thread");

        Self { thread: Some(thread) }
    }

    fn run(
        scheduler: Arc<JobScheduler>,
        executor: JobExecutor,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            if let Some(job) = scheduler.next_job() {
                let job_id = job.id;
                let token = scheduler.get_cancellation_token(job_id).unwrap_or_default();

                if !token.is_cancelled() {
                    executor(&job, &token);
                }

                scheduler.complete_job(job_id);
            } else {
                thread::sleep(poll_interval);
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().expect("worker thread panicked");
        }
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::CacheKind;
    use crate::{JobPriority, JobType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn worker_pool_executes_submitted_jobs() {
        let scheduler = Arc::new(JobScheduler::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let executed_clone = executed.clone();

        let executor = Arc::new(move |_job: &Job, _token: &CancellationToken| {
            executed_clone.fetch_add(1, Ordering::SeqCst);
        });

        let config = WorkerPoolConfig::new(2).with_poll_interval(Duration::from_millis(5));
        let pool = WorkerPool::new(scheduler.clone(), executor, config);

        for i in 0..5 {
            scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: i });
        }

        thread::sleep(Duration::from_millis(150));
        assert_eq!(executed.load(Ordering::SeqCst), 5);

        pool.shutdown();
    }

    #[test]
    fn worker_pool_respects_cancellation() {
        let scheduler = Arc::new(JobScheduler::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();

        let executor = Arc::new(move |_job: &Job, token: &CancellationToken| {
            for _ in 0..20 {
                if token.is_cancelled() {
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
            completed_clone.fetch_add(1, Ordering::SeqCst);
        });

        let config = WorkerPoolConfig::new(1).with_poll_interval(Duration::from_millis(5));
        let pool = WorkerPool::new(scheduler.clone(), executor, config);

        let mut job_ids = Vec::new();
        for i in 0..3 {
            let (job_id, _) =
                scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: i });
            job_ids.push(job_id);
        }

        thread::sleep(Duration::from_millis(30));
        for job_id in job_ids.iter().skip(1) {
            scheduler.cancel_job(*job_id);
        }

        thread::sleep(Duration::from_millis(250));
        assert!(completed.load(Ordering::SeqCst) <= 1);

        pool.shutdown();
    }

    #[test]
    fn worker_pool_runs_highest_priority_first_with_one_worker() {
        let scheduler = Arc::new(JobScheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();

        let executor = Arc::new(move |job: &Job, _token: &CancellationToken| {
            if let JobType::RenderPage { page_index, .. } = job.job_type {
                order_clone.lock().unwrap().push(page_index);
            }
            thread::sleep(Duration::from_millis(10));
        });

        let config = WorkerPoolConfig::new(1).with_poll_interval(Duration::from_millis(5));
        let pool = WorkerPool::new(scheduler.clone(), executor, config);

        scheduler.submit(JobPriority::Background, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 3 });
        scheduler.submit(JobPriority::Adjacent, JobType::RenderPage { cache: CacheKind::Pdf, page_index: 1 });

        thread::sleep(Duration::from_millis(100));
        assert_eq!(*order.lock().unwrap(), vec![1, 3]);

        pool.shutdown();
    }

    #[test]
    fn worker_pool_config_defaults_to_available_parallelism() {
        let config = WorkerPoolConfig::default();
        assert!(config.num_workers > 0);
    }
}
