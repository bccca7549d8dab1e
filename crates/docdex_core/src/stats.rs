//! Index health and progress counters.
//!
//! The execution loop runs detached, so these counters are the only way a
//! caller observes how it is doing. Errors are counted here rather than
//! returned.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters for one index.
#[derive(Debug, Default)]
pub struct IndexStats {
    iterations: AtomicU64,
    idle_iterations: AtomicU64,
    pages_committed: AtomicU64,
    documents_mapped: AtomicU64,
    map_errors: AtomicU64,
    faulted: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl IndexStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_iteration(&self, found_work: bool) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        if !found_work {
            self.idle_iterations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_page(&self, documents: usize) {
        self.pages_committed.fetch_add(1, Ordering::Relaxed);
        self.documents_mapped
            .fetch_add(documents as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, error: &dyn std::fmt::Display) {
        self.map_errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    pub(crate) fn record_fault(&self, error: &dyn std::fmt::Display) {
        self.record_error(error);
        self.faulted.store(true, Ordering::SeqCst);
    }

    /// Loop iterations started.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Iterations that found nothing to map.
    pub fn idle_iterations(&self) -> u64 {
        self.idle_iterations.load(Ordering::Relaxed)
    }

    /// Page write transactions committed.
    pub fn pages_committed(&self) -> u64 {
        self.pages_committed.load(Ordering::Relaxed)
    }

    /// Documents converted and committed.
    pub fn documents_mapped(&self) -> u64 {
        self.documents_mapped.load(Ordering::Relaxed)
    }

    /// Failed iterations, transient and fatal.
    pub fn map_errors(&self) -> u64 {
        self.map_errors.load(Ordering::Relaxed)
    }

    /// True once a fatal error stopped the loop.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Message of the most recent error.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> IndexStatsSnapshot {
        IndexStatsSnapshot {
            iterations: self.iterations(),
            idle_iterations: self.idle_iterations(),
            pages_committed: self.pages_committed(),
            documents_mapped: self.documents_mapped(),
            map_errors: self.map_errors(),
            faulted: self.is_faulted(),
            last_error: self.last_error(),
        }
    }
}

/// Point-in-time copy of [`IndexStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexStatsSnapshot {
    /// Loop iterations started.
    pub iterations: u64,
    /// Iterations that found nothing to map.
    pub idle_iterations: u64,
    /// Page write transactions committed.
    pub pages_committed: u64,
    /// Documents converted and committed.
    pub documents_mapped: u64,
    /// Failed iterations.
    pub map_errors: u64,
    /// Whether a fatal error stopped the loop.
    pub faulted: bool,
    /// Message of the most recent error.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = IndexStats::new();
        stats.record_iteration(true);
        stats.record_iteration(false);
        stats.record_page(2);
        stats.record_page(1);

        let snap = stats.snapshot();
        assert_eq!(snap.iterations, 2);
        assert_eq!(snap.idle_iterations, 1);
        assert_eq!(snap.pages_committed, 2);
        assert_eq!(snap.documents_mapped, 3);
        assert!(!snap.faulted);
    }

    #[test]
    fn fault_records_the_error() {
        let stats = IndexStats::new();
        stats.record_error(&"disk full");
        assert!(!stats.is_faulted());
        stats.record_fault(&"etag 3 out of order");
        assert!(stats.is_faulted());
        assert_eq!(stats.map_errors(), 2);
        assert_eq!(stats.last_error().as_deref(), Some("etag 3 out of order"));
    }
}
