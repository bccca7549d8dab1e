//! Operation contexts bound to one environment.
//!
//! Every read or write an index or document store performs goes through a
//! [`TransactionContext`] allocated from the environment's [`ContextPool`].
//! The pool counts contexts handed out and still alive, so an owner can
//! check nothing outlives it before tearing the environment down.

use crate::env::Environment;
use crate::error::StorageResult;
use crate::transaction::{ReadTransaction, WriteTransaction};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Hands out [`TransactionContext`]s for one environment.
#[derive(Debug)]
pub struct ContextPool {
    env: Arc<Environment>,
    active: AtomicUsize,
    allocations: AtomicU64,
}

impl ContextPool {
    /// Creates a pool for `env`.
    #[must_use]
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            active: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
        }
    }

    /// Allocates a context.
    pub fn allocate(&self) -> TransactionContext<'_> {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::AcqRel);
        TransactionContext { pool: self }
    }

    /// The environment contexts from this pool operate on.
    #[must_use]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Contexts allocated and not yet dropped.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of contexts handed out since the pool was created.
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

/// A context borrowed from a [`ContextPool`].
#[derive(Debug)]
pub struct TransactionContext<'p> {
    pool: &'p ContextPool,
}

impl<'p> TransactionContext<'p> {
    /// Begins a read transaction on the pool's environment.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the environment was closed.
    pub fn read_transaction(&self) -> StorageResult<ReadTransaction> {
        self.pool.env.read_transaction()
    }

    /// Begins the write transaction on the pool's environment.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the environment was closed.
    pub fn write_transaction(&self) -> StorageResult<WriteTransaction<'p>> {
        self.pool.env.write_transaction()
    }

    /// The pool's environment.
    #[must_use]
    pub fn environment(&self) -> &'p Environment {
        &self.pool.env
    }
}

impl Drop for TransactionContext<'_> {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::AcqRel);
    }
}
