//! SpeedyNote Canvas Scheduler Library
//!
//! Priority job queue, cooperative cancellation, and a worker thread pool,
//! used by the Page Cache to debounce and prefetch adjacent pages without
//! blocking the current page's synchronous render (spec.md §4.F).
//!
//! ```
//! use speedynote_canvas_scheduler::{CacheKind, JobPriority, JobScheduler, JobType};
//!
//! let scheduler = JobScheduler::new();
//! let (job_id, _token) = scheduler.submit(
//!     JobPriority::Adjacent,
//!     JobType::RenderPage { cache: CacheKind::Pdf, page_index: 3 },
//! );
//!
//! if let Some(job) = scheduler.next_job() {
//!     scheduler.complete_job(job.id);
//! }
//!
//! scheduler.cancel_page_jobs(0);
//! let _ = job_id;
//! ```

mod cancel;
mod priority;
mod scheduler;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use priority::{CacheKind, Job, JobId, JobPriority, JobType, PriorityQueue};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{JobExecutor, WorkerPool, WorkerPoolConfig};
