//! Journal trait: the append-only byte substrate beneath an environment.

use crate::error::StorageResult;

/// An append-only byte log that backs a storage environment.
///
/// A journal knows nothing about records, trees or transactions. The
/// environment frames its commits into records and hands the raw bytes to
/// the journal.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns, every appended byte survives process termination
/// - `truncate` only shrinks the journal
pub trait Journal: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with `ReadPastEnd` if the range is not fully inside the journal.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it starts at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Current length in bytes, which is also the next append offset.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true when nothing has been appended yet.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Makes all appended bytes durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards everything after `new_len`.
    ///
    /// Used to cut off a torn record after a failed append.
    fn truncate(&mut self, new_len: u64) -> StorageResult<()>;
}
