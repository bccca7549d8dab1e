//! Crash simulation for journals and index writers.
//!
//! ## Test Strategy
//!
//! 1. **Torn commit** - a journal stops accepting bytes in the middle of a
//!    commit record; reopening must drop the torn record only
//! 2. **Failing sink** - an index writer starts failing after some pages;
//!    nothing of the failed pages may be committed, and a reopened index
//!    must resume after the last committed page
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docdex_testkit::crash::CrashableJournal;
//!
//! let journal = CrashableJournal::new();
//! let control = journal.control();
//! control.crash_after(64);
//! // ... commit until an append fails, then reopen from control.durable_bytes()
//! ```

use docdex_core::{
    CancellationToken, CoreError, CoreResult, IndexEntry, IndexWriter, TreeIndexWriter,
};
use docdex_storage::{Journal, StorageError, StorageResult, WriteTransaction};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

fn simulated(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("simulated crash during {what}"),
    ))
}

#[derive(Debug)]
struct CrashState {
    bytes: Mutex<Vec<u8>>,
    crash_after_bytes: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

/// Inspection and control handle for a [`CrashableJournal`].
#[derive(Debug, Clone)]
pub struct CrashControl {
    state: Arc<CrashState>,
}

impl CrashControl {
    /// Makes the journal crash once its length would exceed `bytes`.
    pub fn crash_after(&self, bytes: usize) {
        self.state.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Makes every sync fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.state.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether a crash was simulated.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Bytes that reached the journal, including a torn tail.
    pub fn durable_bytes(&self) -> Vec<u8> {
        self.state.bytes.lock().clone()
    }
}

/// An in-memory journal that can stop mid-append.
///
/// Once crashed, every write, sync and truncate fails, as they would in a
/// process that is already gone.
#[derive(Debug)]
pub struct CrashableJournal {
    state: Arc<CrashState>,
}

impl CrashableJournal {
    /// Creates an empty journal that never crashes until told to.
    pub fn new() -> Self {
        Self::with_bytes(Vec::new())
    }

    /// Creates a journal holding `bytes`.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            state: Arc::new(CrashState {
                bytes: Mutex::new(bytes),
                crash_after_bytes: AtomicUsize::new(usize::MAX),
                crashed: AtomicBool::new(false),
                fail_on_sync: AtomicBool::new(false),
            }),
        }
    }

    /// A handle that outlives the environment owning the journal.
    pub fn control(&self) -> CrashControl {
        CrashControl {
            state: Arc::clone(&self.state),
        }
    }

    fn check_alive(&self, what: &str) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(simulated(what));
        }
        Ok(())
    }
}

impl Default for CrashableJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal for CrashableJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.state.bytes.lock();
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= bytes.len() => Ok(bytes[start..end].to_vec()),
            _ => Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: bytes.len() as u64,
            }),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check_alive("write")?;
        let mut bytes = self.state.bytes.lock();
        let offset = bytes.len();
        let threshold = self.state.crash_after_bytes.load(Ordering::SeqCst);
        if offset + data.len() > threshold {
            let partial = threshold.saturating_sub(offset).min(data.len());
            bytes.extend_from_slice(&data[..partial]);
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("partial write"));
        }
        bytes.extend_from_slice(data);
        Ok(offset as u64)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.state.bytes.lock().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_alive("sync")?;
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("sync"));
        }
        Ok(())
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        self.check_alive("truncate")?;
        self.state.bytes.lock().truncate(new_len as usize);
        Ok(())
    }
}

/// An index writer that delegates to [`TreeIndexWriter`] and starts
/// failing after a number of successful writes.
#[derive(Debug)]
pub struct FailingWriter {
    inner: TreeIndexWriter,
    succeed: AtomicUsize,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl FailingWriter {
    /// Allows `succeed` writes, then fails every call.
    pub fn after(succeed: usize) -> Self {
        Self {
            inner: TreeIndexWriter::new(),
            succeed: AtomicUsize::new(succeed),
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Lets the next `count` writes through again.
    pub fn allow(&self, count: usize) {
        let done = self.calls.load(Ordering::SeqCst);
        self.succeed.store(done + count, Ordering::SeqCst);
    }

    /// Calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that failed.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl IndexWriter for FailingWriter {
    fn write(
        &self,
        tx: &mut WriteTransaction<'_>,
        entries: &[IndexEntry],
        scratch: &mut Vec<u8>,
        token: &CancellationToken,
    ) -> CoreResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.succeed.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            // Partial output must vanish with the rolled back transaction.
            if let Some(first) = entries.first() {
                self.inner
                    .write(tx, std::slice::from_ref(first), scratch, token)?;
            }
            return Err(CoreError::Storage(simulated("index write")));
        }
        self.inner.write(tx, entries, scratch, token)
    }
}
