//! Environment counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by an [`Environment`](crate::Environment).
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct EnvironmentStats {
    read_transactions: AtomicU64,
    write_transactions: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    bytes_written: AtomicU64,
}

impl EnvironmentStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read_transaction(&self) {
        self.read_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_transaction(&self) {
        self.write_transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, bytes: u64) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Read transactions opened.
    pub fn read_transactions(&self) -> u64 {
        self.read_transactions.load(Ordering::Relaxed)
    }

    /// Write transactions opened.
    pub fn write_transactions(&self) -> u64 {
        self.write_transactions.load(Ordering::Relaxed)
    }

    /// Write transactions committed, including empty ones.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Write transactions rolled back, explicitly or by a failed commit.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Journal bytes written by commits.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Copies every counter into a plain struct.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            read_transactions: self.read_transactions(),
            write_transactions: self.write_transactions(),
            commits: self.commits(),
            rollbacks: self.rollbacks(),
            bytes_written: self.bytes_written(),
        }
    }
}

/// Point-in-time copy of [`EnvironmentStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Read transactions opened.
    pub read_transactions: u64,
    /// Write transactions opened.
    pub write_transactions: u64,
    /// Committed write transactions.
    pub commits: u64,
    /// Rolled back write transactions.
    pub rollbacks: u64,
    /// Journal bytes written.
    pub bytes_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_counters() {
        let stats = EnvironmentStats::new();
        stats.record_commit(64);
        stats.record_commit(16);
        stats.record_rollback();
        stats.record_read_transaction();

        let snap = stats.snapshot();
        assert_eq!(snap.commits, 2);
        assert_eq!(snap.bytes_written, 80);
        assert_eq!(snap.rollbacks, 1);
        assert_eq!(snap.read_transactions, 1);
        assert_eq!(snap.write_transactions, 0);
    }
}
