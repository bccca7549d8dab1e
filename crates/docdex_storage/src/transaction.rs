//! Read and write transactions over named trees.
//!
//! Readers work on an immutable snapshot and never block the writer. The
//! single writer holds the environment's write lock for its whole
//! lifetime and records its changes as a per-tree delta layered over the
//! snapshot it started from; nothing it does is visible until
//! [`WriteTransaction::commit`] publishes them. Dropping a write
//! transaction without committing rolls it back.

use crate::env::{Environment, Snapshot, Tree};
use crate::error::{StorageError, StorageResult};
use crate::record::TreeOp;
use bytes::Bytes;
use parking_lot::MutexGuard;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::ops::Bound;
use std::sync::Arc;

/// Pending changes of one tree; `None` marks a deleted key.
type Delta = BTreeMap<Bytes, Option<Bytes>>;

/// Read access shared by both transaction kinds.
pub trait Readable {
    /// Opens a tree for reading, if it exists.
    fn tree(&self, name: &str) -> Option<TreeReader<'_>>;

    /// Reads one value.
    fn get(&self, tree: &str, key: &[u8]) -> Option<Bytes> {
        self.tree(tree).and_then(|t| t.get(key))
    }

    /// Returns true if the tree exists.
    fn has_tree(&self, name: &str) -> bool {
        self.tree(name).is_some()
    }
}

/// A borrowed view of one tree, including the writer's pending changes.
#[derive(Debug, Clone, Copy)]
pub struct TreeReader<'t> {
    name: &'t str,
    base: Option<&'t Tree>,
    delta: Option<&'t Delta>,
}

impl<'t> TreeReader<'t> {
    /// Name of the tree.
    #[must_use]
    pub fn name(&self) -> &'t str {
        self.name
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        if let Some(pending) = self.delta.and_then(|d| d.get(key)) {
            return pending.clone();
        }
        self.base.and_then(|b| b.get(key).cloned())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let base = self.base.map_or(0, BTreeMap::len);
        let Some(delta) = self.delta else {
            return base;
        };
        delta.iter().fold(base, |len, (key, value)| {
            let existed = self.base.is_some_and(|b| b.contains_key(key));
            match (existed, value.is_some()) {
                (false, true) => len + 1,
                (true, false) => len - 1,
                _ => len,
            }
        })
    }

    /// Returns true if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry with the greatest key.
    #[must_use]
    pub fn last(&self) -> Option<(&'t Bytes, &'t Bytes)> {
        let base = self.base.into_iter().flat_map(|b| b.iter().rev());
        let delta = self.delta.into_iter().flat_map(|d| d.iter().rev());
        Merged::new(base, delta, Ordering::Greater).next()
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&'t Bytes, &'t Bytes)> + 't {
        self.merged_range(Bound::Unbounded)
    }

    /// Entries with keys greater than or equal to `key`, in key order.
    pub fn range_from(&self, key: &[u8]) -> impl Iterator<Item = (&'t Bytes, &'t Bytes)> + 't {
        self.merged_range(Bound::Included(key))
    }

    /// Entries with keys strictly greater than `key`, in key order.
    pub fn range_after(&self, key: &[u8]) -> impl Iterator<Item = (&'t Bytes, &'t Bytes)> + 't {
        self.merged_range(Bound::Excluded(key))
    }

    /// Entries whose key starts with `prefix`.
    pub fn prefix<'p>(
        &self,
        prefix: &'p [u8],
    ) -> impl Iterator<Item = (&'t Bytes, &'t Bytes)> + 'p
    where
        't: 'p,
    {
        self.merged_range(Bound::Included(prefix))
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    fn merged_range(
        &self,
        start: Bound<&[u8]>,
    ) -> impl Iterator<Item = (&'t Bytes, &'t Bytes)> + 't {
        let bounds = (start, Bound::Unbounded);
        let base = self.base.map(|b| b.range::<[u8], _>(bounds));
        let delta = self.delta.map(|d| d.range::<[u8], _>(bounds));
        Merged::new(base.into_iter().flatten(), delta.into_iter().flatten(), Ordering::Less)
    }
}

/// Merges committed entries with pending changes, both sorted in the
/// direction given by `order` (`Less` ascending, `Greater` descending).
struct Merged<'t, B, D>
where
    B: Iterator<Item = (&'t Bytes, &'t Bytes)>,
    D: Iterator<Item = (&'t Bytes, &'t Option<Bytes>)>,
{
    base: Peekable<B>,
    delta: Peekable<D>,
    order: Ordering,
}

impl<'t, B, D> Merged<'t, B, D>
where
    B: Iterator<Item = (&'t Bytes, &'t Bytes)>,
    D: Iterator<Item = (&'t Bytes, &'t Option<Bytes>)>,
{
    fn new(base: B, delta: D, order: Ordering) -> Self {
        Self {
            base: base.peekable(),
            delta: delta.peekable(),
            order,
        }
    }
}

impl<'t, B, D> Iterator for Merged<'t, B, D>
where
    B: Iterator<Item = (&'t Bytes, &'t Bytes)>,
    D: Iterator<Item = (&'t Bytes, &'t Option<Bytes>)>,
{
    type Item = (&'t Bytes, &'t Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let base_key = self.base.peek().map(|(key, _)| *key);
            let delta_key = self.delta.peek().map(|(key, _)| *key);
            let take_base = match (base_key, delta_key) {
                (None, None) => return None,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(b), Some(d)) => {
                    let ord = b.cmp(d);
                    if ord == Ordering::Equal {
                        self.base.next();
                    }
                    ord == self.order
                }
            };
            if take_base {
                return self.base.next();
            }
            if let Some((key, Some(value))) = self.delta.next() {
                return Some((key, value));
            }
        }
    }
}

/// A read-only transaction over a committed snapshot.
///
/// Cheap to open; it pins the snapshot it was opened on and keeps seeing
/// it regardless of later commits.
#[derive(Debug, Clone)]
pub struct ReadTransaction {
    snapshot: Arc<Snapshot>,
}

impl ReadTransaction {
    pub(crate) fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    /// Id of the last transaction visible to this reader.
    #[must_use]
    pub fn txid(&self) -> u64 {
        self.snapshot.txid
    }

    /// Names of every tree, sorted.
    #[must_use]
    pub fn tree_names(&self) -> Vec<String> {
        self.snapshot.trees.keys().cloned().collect()
    }
}

impl Readable for ReadTransaction {
    fn tree(&self, name: &str) -> Option<TreeReader<'_>> {
        self.snapshot
            .trees
            .get_key_value(name)
            .map(|(name, entries)| TreeReader {
                name: name.as_str(),
                base: Some(entries.as_ref()),
                delta: None,
            })
    }
}

/// The environment's single write transaction.
///
/// Memory grows with the changes made, not with the size of the trees
/// they touch.
pub struct WriteTransaction<'env> {
    env: &'env Environment,
    _writer: MutexGuard<'env, ()>,
    base_txid: u64,
    base: Arc<Snapshot>,
    created: BTreeSet<String>,
    deltas: BTreeMap<String, Delta>,
    ops: Vec<TreeOp>,
    finished: bool,
}

impl<'env> WriteTransaction<'env> {
    pub(crate) fn new(
        env: &'env Environment,
        writer: MutexGuard<'env, ()>,
        base: Arc<Snapshot>,
    ) -> Self {
        Self {
            env,
            _writer: writer,
            base_txid: base.txid,
            base,
            created: BTreeSet::new(),
            deltas: BTreeMap::new(),
            ops: Vec::new(),
            finished: false,
        }
    }

    /// Id of the snapshot this transaction started from.
    #[must_use]
    pub fn base_txid(&self) -> u64 {
        self.base_txid
    }

    /// Number of mutations recorded so far.
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    /// Creates `name` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `TooLarge` for names longer than 65 535 bytes.
    pub fn create_tree(&mut self, name: &str) -> StorageResult<()> {
        if self.tree_exists(name) {
            return Ok(());
        }
        if name.len() > u16::MAX as usize {
            return Err(StorageError::TooLarge {
                len: name.len(),
                max: u16::MAX as usize,
            });
        }
        self.created.insert(name.to_owned());
        self.ops.push(TreeOp::CreateTree {
            tree: name.to_owned(),
        });
        Ok(())
    }

    /// Inserts or replaces `key` in `tree`.
    ///
    /// # Errors
    ///
    /// Returns `TreeNotFound` if the tree was never created.
    pub fn put(
        &mut self,
        tree: &str,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> StorageResult<()> {
        if !self.tree_exists(tree) {
            return Err(StorageError::tree_not_found(tree));
        }
        let key = key.into();
        let value = value.into();
        self.delta_mut(tree).insert(key.clone(), Some(value.clone()));
        self.ops.push(TreeOp::Put {
            tree: tree.to_owned(),
            key,
            value,
        });
        Ok(())
    }

    /// Removes `key` from `tree`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `TreeNotFound` if the tree was never created.
    pub fn delete(&mut self, tree: &str, key: &[u8]) -> StorageResult<bool> {
        let present = self
            .tree(tree)
            .ok_or_else(|| StorageError::tree_not_found(tree))?
            .get(key)
            .is_some();
        if !present {
            return Ok(false);
        }
        let key = Bytes::copy_from_slice(key);
        self.delta_mut(tree).insert(key.clone(), None);
        self.ops.push(TreeOp::Delete {
            tree: tree.to_owned(),
            key,
        });
        Ok(true)
    }

    /// Commits every mutation atomically and returns the new transaction id.
    ///
    /// On error nothing is published and the transaction is rolled back.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the environment was closed, or the journal error
    /// that prevented the commit record from being written.
    pub fn commit(mut self) -> StorageResult<u64> {
        self.finished = true;
        let ops = std::mem::take(&mut self.ops);
        self.deltas.clear();
        // Unpin the base so publishing can update its trees in place.
        self.base = Arc::default();
        self.env.publish(self.base_txid, ops)
    }

    /// Discards every mutation.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn tree_exists(&self, name: &str) -> bool {
        self.created.contains(name) || self.base.trees.contains_key(name)
    }

    fn delta_mut(&mut self, tree: &str) -> &mut Delta {
        self.deltas.entry(tree.to_owned()).or_default()
    }

    fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if !self.ops.is_empty() {
            tracing::debug!(ops = self.ops.len(), "rolling back write transaction");
        }
        self.env.stats().record_rollback();
    }
}

impl Readable for WriteTransaction<'_> {
    fn tree(&self, name: &str) -> Option<TreeReader<'_>> {
        let (name, base) = match self.base.trees.get_key_value(name) {
            Some((name, entries)) => (name, Some(entries.as_ref())),
            None => (self.created.get(name)?, None),
        };
        Some(TreeReader {
            name: name.as_str(),
            base,
            delta: self.deltas.get(name.as_str()),
        })
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("base_txid", &self.base_txid)
            .field("pending_ops", &self.ops.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_tree(name: &str) -> Environment {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        tx.create_tree(name).unwrap();
        tx.commit().unwrap();
        env
    }

    #[test]
    fn writer_sees_its_own_writes() {
        let env = env_with_tree("t");
        let mut tx = env.write_transaction().unwrap();
        tx.put("t", &b"k"[..], &b"v"[..]).unwrap();
        assert_eq!(tx.get("t", b"k").as_deref(), Some(&b"v"[..]));
        assert_eq!(tx.pending_ops(), 1);
    }

    #[test]
    fn readers_do_not_see_uncommitted_writes() {
        let env = env_with_tree("t");
        let mut tx = env.write_transaction().unwrap();
        tx.put("t", &b"k"[..], &b"v"[..]).unwrap();

        let reader = env.read_transaction().unwrap();
        assert!(reader.get("t", b"k").is_none());
        tx.commit().unwrap();

        assert!(reader.get("t", b"k").is_none());
        let fresh = env.read_transaction().unwrap();
        assert_eq!(fresh.get("t", b"k").as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn dropped_writer_rolls_back() {
        let env = env_with_tree("t");
        {
            let mut tx = env.write_transaction().unwrap();
            tx.put("t", &b"k"[..], &b"v"[..]).unwrap();
        }
        assert!(env.read_transaction().unwrap().get("t", b"k").is_none());
        assert_eq!(env.stats().rollbacks(), 1);
    }

    #[test]
    fn put_into_missing_tree_fails() {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        assert!(matches!(
            tx.put("nope", &b"k"[..], &b"v"[..]),
            Err(StorageError::TreeNotFound { .. })
        ));
    }

    #[test]
    fn delete_reports_presence() {
        let env = env_with_tree("t");
        let mut tx = env.write_transaction().unwrap();
        tx.put("t", &b"k"[..], &b"v"[..]).unwrap();
        assert!(tx.delete("t", b"k").unwrap());
        assert!(!tx.delete("t", b"k").unwrap());
        tx.commit().unwrap();
        assert!(env.read_transaction().unwrap().tree("t").unwrap().is_empty());
    }

    #[test]
    fn range_and_prefix_scans() {
        let env = env_with_tree("t");
        let mut tx = env.write_transaction().unwrap();
        for key in ["a/1", "a/2", "b/1", "b/2", "c"] {
            tx.put("t", key.as_bytes().to_vec(), Vec::<u8>::new()).unwrap();
        }
        tx.commit().unwrap();

        let reader = env.read_transaction().unwrap();
        let tree = reader.tree("t").unwrap();
        let after: Vec<_> = tree.range_after(b"a/2").map(|(k, _)| k.clone()).collect();
        assert_eq!(after, vec!["b/1", "b/2", "c"]);
        let from: Vec<_> = tree.range_from(b"b/2").map(|(k, _)| k.clone()).collect();
        assert_eq!(from, vec!["b/2", "c"]);
        let b: Vec<_> = tree.prefix(b"b/").map(|(k, _)| k.clone()).collect();
        assert_eq!(b, vec!["b/1", "b/2"]);
        assert_eq!(tree.last().unwrap().0, "c");
        assert_eq!(tree.name(), "t");
    }

    #[test]
    fn create_tree_is_idempotent() {
        let env = env_with_tree("t");
        let mut tx = env.write_transaction().unwrap();
        tx.create_tree("t").unwrap();
        assert_eq!(tx.pending_ops(), 0);
    }

    #[test]
    fn writer_scans_merge_pending_changes() {
        let env = env_with_tree("t");
        let mut tx = env.write_transaction().unwrap();
        for key in ["a", "b", "c", "d"] {
            tx.put("t", key.as_bytes().to_vec(), &b"old"[..]).unwrap();
        }
        tx.commit().unwrap();

        let mut tx = env.write_transaction().unwrap();
        tx.put("t", &b"b"[..], &b"new"[..]).unwrap();
        tx.put("t", &b"bb"[..], &b"new"[..]).unwrap();
        assert!(tx.delete("t", b"c").unwrap());
        assert!(tx.delete("t", b"d").unwrap());
        assert!(!tx.delete("t", b"zz").unwrap());

        let tree = tx.tree("t").unwrap();
        let all: Vec<_> = tree
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(
            all,
            vec![
                (Bytes::from("a"), Bytes::from("old")),
                (Bytes::from("b"), Bytes::from("new")),
                (Bytes::from("bb"), Bytes::from("new")),
            ]
        );
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.last().unwrap().0, "bb");
        let after: Vec<_> = tree.range_after(b"a").map(|(k, _)| k.clone()).collect();
        assert_eq!(after, vec!["b", "bb"]);
        let b: Vec<_> = tree.prefix(b"b").map(|(k, _)| k.clone()).collect();
        assert_eq!(b, vec!["b", "bb"]);
    }

    #[test]
    fn tree_created_in_the_writer_is_readable_before_commit() {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        tx.create_tree("fresh").unwrap();
        assert!(tx.tree("fresh").unwrap().is_empty());
        tx.put("fresh", &b"k"[..], &b"v"[..]).unwrap();
        assert_eq!(tx.tree("fresh").unwrap().len(), 1);
        assert_eq!(tx.tree("fresh").unwrap().name(), "fresh");
        assert!(!env.read_transaction().unwrap().has_tree("fresh"));
        tx.commit().unwrap();
        assert!(env.read_transaction().unwrap().has_tree("fresh"));
    }
}
