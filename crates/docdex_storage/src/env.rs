//! The storage environment: named trees, snapshots and the commit path.

use crate::dir::EnvironmentDir;
use crate::error::{StorageError, StorageResult};
use crate::file::FileJournal;
use crate::journal::Journal;
use crate::memory::MemoryJournal;
use crate::reader::JournalReader;
use crate::record::{JournalRecord, TreeDump, TreeOp};
use crate::stats::EnvironmentStats;
use crate::transaction::{ReadTransaction, WriteTransaction};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entries of one tree, ordered by key.
pub(crate) type Tree = BTreeMap<Bytes, Bytes>;

/// A committed state. Readers share it behind an `Arc`.
#[derive(Debug, Default, Clone)]
pub(crate) struct Snapshot {
    pub(crate) txid: u64,
    pub(crate) trees: BTreeMap<String, Arc<Tree>>,
}

/// Options for opening an environment.
#[derive(Debug, Clone)]
pub struct EnvironmentOptions {
    /// Sync the journal before a commit returns.
    pub sync_on_commit: bool,
    /// Create the directory when it does not exist.
    pub create_if_missing: bool,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            create_if_missing: true,
        }
    }
}

impl EnvironmentOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commits sync the journal.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether a missing directory is created.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}

/// Outcome of [`Environment::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Journal length before compaction.
    pub bytes_before: u64,
    /// Journal length after compaction.
    pub bytes_after: u64,
}

/// A transactional key/value store made of named trees.
///
/// One writer and any number of readers may be active at once. Commits are
/// appended to a journal as single framed records, so a commit is either
/// fully replayed on the next open or not at all.
///
/// # Example
///
/// ```rust
/// use docdex_storage::{Environment, Readable};
///
/// let env = Environment::in_memory();
/// let mut tx = env.write_transaction().unwrap();
/// tx.create_tree("Stats").unwrap();
/// tx.put("Stats", &b"Type"[..], 1i32.to_le_bytes().to_vec()).unwrap();
/// tx.commit().unwrap();
///
/// let reader = env.read_transaction().unwrap();
/// assert_eq!(&reader.get("Stats", b"Type").unwrap()[..], &[1, 0, 0, 0]);
/// ```
pub struct Environment {
    options: EnvironmentOptions,
    dir: Mutex<Option<EnvironmentDir>>,
    journal: Mutex<Box<dyn Journal>>,
    current: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
    closed: AtomicBool,
    stats: EnvironmentStats,
}

impl Environment {
    /// Opens or creates a persistent environment in directory `path`.
    ///
    /// # Errors
    ///
    /// - `Locked` if the directory is held by another environment
    /// - `NotFound` if it is missing and `create_if_missing` is off
    /// - `Corrupted` / `ChecksumMismatch` if the journal is damaged
    pub fn open(path: &Path, options: EnvironmentOptions) -> StorageResult<Self> {
        let dir = EnvironmentDir::open(path, options.create_if_missing)?;
        let journal = FileJournal::open(&dir.journal_path())?;
        let env = Self::from_journal(Box::new(journal), options)?;
        *env.dir.lock() = Some(dir);
        tracing::debug!(path = %path.display(), txid = env.last_txid(), "opened environment");
        Ok(env)
    }

    /// Creates an empty environment that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::in_memory_with(EnvironmentOptions::default())
    }

    /// Creates an empty in-memory environment with explicit options.
    #[must_use]
    pub fn in_memory_with(options: EnvironmentOptions) -> Self {
        Self::empty(Box::new(MemoryJournal::new()), options)
    }

    /// Builds an environment over any journal, replaying its records.
    ///
    /// A torn trailing record is cut off before the environment is returned.
    ///
    /// # Errors
    ///
    /// Returns the journal's I/O errors and any fatal replay error.
    pub fn from_journal(
        mut journal: Box<dyn Journal>,
        options: EnvironmentOptions,
    ) -> StorageResult<Self> {
        let (snapshot, torn_at) = replay(journal.as_ref())?;
        if let Some(offset) = torn_at {
            journal.truncate(offset)?;
        }
        let env = Self::empty(journal, options);
        *env.current.write() = Arc::new(snapshot);
        Ok(env)
    }

    fn empty(journal: Box<dyn Journal>, options: EnvironmentOptions) -> Self {
        Self {
            options,
            dir: Mutex::new(None),
            journal: Mutex::new(journal),
            current: RwLock::new(Arc::new(Snapshot::default())),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            stats: EnvironmentStats::new(),
        }
    }

    /// Options the environment was opened with.
    #[must_use]
    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    /// Counters for commits, rollbacks and journal traffic.
    #[must_use]
    pub fn stats(&self) -> &EnvironmentStats {
        &self.stats
    }

    /// Id of the last committed transaction.
    #[must_use]
    pub fn last_txid(&self) -> u64 {
        self.current.read().txid
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns true for environments backed by a directory.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.dir.lock().is_some()
    }

    /// Directory of a persistent environment that is still open.
    #[must_use]
    pub fn path(&self) -> Option<std::path::PathBuf> {
        self.dir.lock().as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Current journal length in bytes.
    ///
    /// # Errors
    ///
    /// Returns the journal's I/O error.
    pub fn journal_len(&self) -> StorageResult<u64> {
        self.journal.lock().len()
    }

    /// Begins a read transaction on the latest committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after the environment was closed.
    pub fn read_transaction(&self) -> StorageResult<ReadTransaction> {
        self.ensure_open()?;
        self.stats.record_read_transaction();
        Ok(ReadTransaction::new(Arc::clone(&self.current.read())))
    }

    /// Begins the write transaction, blocking while another writer is active.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after the environment was closed.
    pub fn write_transaction(&self) -> StorageResult<WriteTransaction<'_>> {
        self.ensure_open()?;
        let writer = self.write_lock.lock();
        self.ensure_open()?;
        self.stats.record_write_transaction();
        let base = Arc::clone(&self.current.read());
        Ok(WriteTransaction::new(self, writer, base))
    }

    /// Appends the commit record and applies `ops` to the current snapshot.
    ///
    /// Called with the write lock held by the committing transaction. Trees
    /// are updated in place; a tree is copied first only while a reader
    /// still holds the snapshot it belongs to.
    pub(crate) fn publish(&self, base_txid: u64, ops: Vec<TreeOp>) -> StorageResult<u64> {
        if let Err(err) = self.ensure_open() {
            self.stats.record_rollback();
            return Err(err);
        }
        if ops.is_empty() {
            self.stats.record_commit(0);
            return Ok(base_txid);
        }

        let txid = base_txid + 1;
        let record = JournalRecord::Commit { txid, ops };
        let encoded = match record.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                self.stats.record_rollback();
                return Err(err);
            }
        };

        {
            let mut journal = self.journal.lock();
            let before = journal.len()?;
            let written = journal.append(&encoded).and_then(|_| {
                if self.options.sync_on_commit {
                    journal.sync()
                } else {
                    Ok(())
                }
            });
            if let Err(err) = written {
                if let Err(cut) = journal.truncate(before) {
                    tracing::warn!(
                        error = %cut,
                        offset = before,
                        "could not cut failed commit from journal"
                    );
                }
                self.stats.record_rollback();
                return Err(err);
            }
        }

        if let JournalRecord::Commit { ops, .. } = record {
            let mut current = self.current.write();
            let snapshot = Arc::make_mut(&mut *current);
            for op in ops {
                apply_published(&mut snapshot.trees, op);
            }
            snapshot.txid = txid;
        }
        self.stats.record_commit(encoded.len() as u64);
        Ok(txid)
    }

    /// Rewrites the journal as a single snapshot record.
    ///
    /// Persistent environments write the snapshot to a temporary file and
    /// rename it over the journal, so a crash leaves either the old or the
    /// new journal. Blocks until the active writer finishes.
    ///
    /// # Errors
    ///
    /// Returns `Closed` or the I/O error that stopped compaction.
    pub fn compact(&self) -> StorageResult<CompactionReport> {
        self.ensure_open()?;
        let _writer = self.write_lock.lock();
        let snapshot = Arc::clone(&self.current.read());
        let trees: Vec<TreeDump> = snapshot
            .trees
            .iter()
            .map(|(name, tree)| {
                let entries = tree.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                (name.clone(), entries)
            })
            .collect();
        let encoded = JournalRecord::Snapshot {
            txid: snapshot.txid,
            trees,
        }
        .encode()?;

        let mut journal = self.journal.lock();
        let bytes_before = journal.len()?;
        let dir = self.dir.lock();
        match dir.as_ref() {
            Some(dir) => {
                let temp = dir.compaction_path();
                {
                    let mut out = FileJournal::open(&temp)?;
                    out.truncate(0)?;
                    out.append(&encoded)?;
                    out.sync()?;
                }
                std::fs::rename(&temp, dir.journal_path())?;
                *journal = Box::new(FileJournal::open(&dir.journal_path())?);
            }
            None => {
                journal.truncate(0)?;
                journal.append(&encoded)?;
                journal.sync()?;
            }
        }
        let bytes_after = journal.len()?;
        tracing::info!(bytes_before, bytes_after, txid = snapshot.txid, "compacted journal");
        Ok(CompactionReport {
            bytes_before,
            bytes_after,
        })
    }

    /// Syncs the journal and releases the directory lock.
    ///
    /// Waits for an active writer to finish. Closing twice is a no-op.
    /// Transactions begun afterwards fail with `Closed`; readers that are
    /// already open keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns the journal's sync error; the lock is released regardless.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _writer = self.write_lock.lock();
        let synced = self.journal.lock().sync();
        let released = self.dir.lock().take();
        if let Some(dir) = released {
            tracing::debug!(path = %dir.path().display(), "closed environment");
        }
        synced
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to sync journal while dropping environment");
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("last_txid", &self.last_txid())
            .field("closed", &self.is_closed())
            .field("persistent", &self.is_persistent())
            .finish_non_exhaustive()
    }
}

/// Rebuilds the committed state from a journal.
fn replay(journal: &dyn Journal) -> StorageResult<(Snapshot, Option<u64>)> {
    let mut trees: BTreeMap<String, Tree> = BTreeMap::new();
    let mut txid = 0;
    let mut reader = JournalReader::new(journal)?;

    while let Some((offset, record)) = reader.next_record()? {
        match record {
            JournalRecord::Commit { txid: id, ops } => {
                for op in ops {
                    apply(&mut trees, op, offset)?;
                }
                txid = id;
            }
            JournalRecord::Snapshot { txid: id, trees: dump } => {
                trees = dump
                    .into_iter()
                    .map(|(name, entries)| (name, entries.into_iter().collect()))
                    .collect();
                txid = id;
            }
        }
    }

    let snapshot = Snapshot {
        txid,
        trees: trees.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
    };
    Ok((snapshot, reader.torn_at()))
}

/// Applies an op the writer already validated against the same state.
fn apply_published(trees: &mut BTreeMap<String, Arc<Tree>>, op: TreeOp) {
    match op {
        TreeOp::CreateTree { tree } => {
            trees.entry(tree).or_default();
        }
        TreeOp::Put { tree, key, value } => {
            if let Some(entries) = trees.get_mut(&tree) {
                Arc::make_mut(entries).insert(key, value);
            }
        }
        TreeOp::Delete { tree, key } => {
            if let Some(entries) = trees.get_mut(&tree) {
                Arc::make_mut(entries).remove(&key);
            }
        }
    }
}

fn apply(trees: &mut BTreeMap<String, Tree>, op: TreeOp, offset: u64) -> StorageResult<()> {
    match op {
        TreeOp::CreateTree { tree } => {
            trees.entry(tree).or_default();
        }
        TreeOp::Put { tree, key, value } => {
            trees
                .get_mut(&tree)
                .ok_or_else(|| missing_tree(&tree, offset))?
                .insert(key, value);
        }
        TreeOp::Delete { tree, key } => {
            trees
                .get_mut(&tree)
                .ok_or_else(|| missing_tree(&tree, offset))?
                .remove(&key);
        }
    }
    Ok(())
}

fn missing_tree(tree: &str, offset: u64) -> StorageError {
    StorageError::corrupted(format!(
        "record at offset {offset} writes to unknown tree {tree}"
    ))
}
