//! Scratch buffers owned by one index.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const DEFAULT_BUFFER_CAPACITY: usize = 1024;
const MAX_RETAINED: usize = 64;

/// A pool of byte buffers reused across pages.
///
/// The pool lives as long as its index and is freed in one step by
/// [`release`](Self::release) at dispose. Buffers handed out after that
/// are plain allocations that are not retained.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    released: AtomicBool,
    acquired: AtomicU64,
    reused: AtomicU64,
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows an empty buffer with at least `capacity` bytes reserved.
    pub fn acquire(&self, capacity: usize) -> PooledBuffer<'_> {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        let reused = self.free.lock().pop();
        let mut buf = match reused {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => Vec::with_capacity(capacity.max(DEFAULT_BUFFER_CAPACITY)),
        };
        buf.reserve(capacity);
        PooledBuffer { pool: self, buf }
    }

    /// Buffers waiting for reuse.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Bytes reserved by the buffers waiting for reuse.
    #[must_use]
    pub fn retained_bytes(&self) -> usize {
        self.free.lock().iter().map(Vec::capacity).sum()
    }

    /// Buffers handed out, and how many of those were reused.
    #[must_use]
    pub fn usage(&self) -> (u64, u64) {
        (
            self.acquired.load(Ordering::Relaxed),
            self.reused.load(Ordering::Relaxed),
        )
    }

    /// Drops idle buffers down to `keep`, returning the bytes freed.
    pub fn trim(&self, keep: usize) -> usize {
        let mut free = self.free.lock();
        if free.len() <= keep {
            return 0;
        }
        free.sort_by_key(Vec::capacity);
        free.drain(keep..).map(|buf| buf.capacity()).sum()
    }

    /// Frees every buffer and stops retaining returned ones.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.free.lock().clear();
    }

    /// Returns true after [`release`](Self::release).
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        if self.is_released() {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < MAX_RETAINED {
            free.push(buf);
        }
    }
}

/// A buffer borrowed from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer<'p> {
    pool: &'p BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused_and_cleared() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(16);
            buf.extend_from_slice(b"entry");
        }
        let buf = pool.acquire(16);
        assert!(buf.is_empty());
        assert_eq!(pool.usage(), (2, 1));
    }

    #[test]
    fn trim_keeps_the_smallest_buffers() {
        let pool = BufferPool::new();
        let held: Vec<_> = (0..4).map(|i| pool.acquire(2048 * (i + 1))).collect();
        drop(held);
        assert_eq!(pool.free_count(), 4);

        let freed = pool.trim(1);
        assert!(freed >= 2048 * 9);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.trim(1), 0);
    }

    #[test]
    fn released_pool_retains_nothing() {
        let pool = BufferPool::new();
        let buf = pool.acquire(8);
        pool.release();
        drop(buf);
        assert_eq!(pool.free_count(), 0);
        assert!(pool.is_released());
    }
}
