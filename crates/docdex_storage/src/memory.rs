//! In-memory journal for ephemeral environments and tests.

use crate::error::{StorageError, StorageResult};
use crate::journal::Journal;
use parking_lot::RwLock;
use std::io;

/// A journal held entirely in memory.
///
/// Environments opened with [`crate::Environment::in_memory`] use this
/// journal; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal that already holds `bytes`, for replay tests.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Returns a copy of the journal contents.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl Journal for MemoryJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(len);
        if offset > size || end > bytes.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(bytes[start..end].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        if new_len > bytes.len() as u64 {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot grow journal from {} to {new_len}", bytes.len()),
            )));
        }
        bytes.truncate(new_len as usize);
        Ok(())
    }
}
