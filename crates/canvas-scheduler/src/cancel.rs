//! Cancellation token system for jobs.
//!
//! Provides cancellation tokens that allow running jobs to be cancelled
//! cooperatively. Workers can check if a job has been cancelled and stop
//! processing early.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative job cancellation.
///
/// Workers periodically check `is_cancelled()` to determine if they should
/// stop processing. Multiple tokens can share the same underlying
/// cancellation state via `Arc`.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token. Idempotent; all clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Reset to non-cancelled state. All clones are reset too.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Associates job IDs with cancellation tokens so jobs can be cancelled by ID.
pub struct CancellationRegistry {
    tokens: Arc<std::sync::Mutex<std::collections::HashMap<crate::JobId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self { tokens: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())) }
    }

    pub fn register(&self, job_id: crate::JobId) -> CancellationToken {
        let token = CancellationToken::new();
        let mut tokens = self.tokens.lock().unwrap();
        tokens.insert(job_id, token.clone());
        token
    }

    /// Returns `true` if the job was found and cancelled.
    pub fn cancel(&self, job_id: crate::JobId) -> bool {
        let tokens = self.tokens.lock().unwrap();
        if let Some(token) = tokens.get(&job_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn cancel_many(&self, job_ids: &[crate::JobId]) -> usize {
        let mut cancelled = 0;
        let tokens = self.tokens.lock().unwrap();
        for job_id in job_ids {
            if let Some(token) = tokens.get(job_id) {
                token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock().unwrap();
        let count = tokens.len();
        for token in tokens.values() {
            token.cancel();
        }
        count
    }

    /// Returns `true` if the job was found.
    pub fn unregister(&self, job_id: crate::JobId) -> bool {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: crate::JobId) -> Option<CancellationToken> {
        let tokens = self.tokens.lock().unwrap();
        tokens.get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        let tokens = self.tokens.lock().unwrap();
        tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        let tokens = self.tokens.lock().unwrap();
        tokens.is_empty()
    }

    pub fn clear(&self) {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.clear();
    }
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled_and_cancels_idempotently() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_cancellation_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();
        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[test]
    fn reset_clears_clones_too() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn registry_cancel_many_reports_found_count() {
        let registry = CancellationRegistry::new();
        let token1 = registry.register(1);
        let token2 = registry.register(2);
        let token3 = registry.register(3);

        let cancelled = registry.cancel_many(&[1, 2, 999]);
        assert_eq!(cancelled, 2);
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
        assert!(!token3.is_cancelled());
    }

    #[test]
    fn registry_unregister_is_one_shot() {
        let registry = CancellationRegistry::new();
        registry.register(1);
        assert!(registry.unregister(1));
        assert!(!registry.unregister(1));
    }
}
