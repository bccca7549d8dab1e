//! Cooperative cancellation for index workers.
//!
//! A [`CancellationToken`] is a shared flag plus a condition variable.
//! Tokens created with [`CancellationToken::linked`] are cancelled when
//! any of their parents is. Besides cancellation, a token can be *woken*:
//! a wake interrupts (or pre-empts) one idle wait without stopping
//! anything, which is how document writes nudge an idle index.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Why [`CancellationToken::wait_timeout`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The token was cancelled.
    Cancelled,
    /// The token was woken.
    Woken,
    /// The timeout elapsed.
    TimedOut,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    woken: Mutex<bool>,
    signal: Condvar,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let _guard = self.woken.lock();
            self.signal.notify_all();
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cloneable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token cancelled as soon as any of `parents` is.
    #[must_use]
    pub fn linked(parents: &[&CancellationToken]) -> Self {
        let child = Self::new();
        for parent in parents {
            parent
                .inner
                .children
                .lock()
                .push(Arc::downgrade(&child.inner));
            if parent.is_cancelled() {
                child.cancel();
            }
        }
        child
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Cancelled` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] once the token is cancelled.
    pub fn check(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    /// Interrupts the current or next idle wait.
    pub fn wake(&self) {
        let mut woken = self.inner.woken.lock();
        *woken = true;
        self.inner.signal.notify_all();
    }

    /// Blocks until cancelled, woken or `timeout` elapses.
    ///
    /// A wake that happened while nobody was waiting is consumed by the
    /// next call, which returns immediately.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut woken = self.inner.woken.lock();
        loop {
            if self.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if *woken {
                *woken = false;
                return WaitOutcome::Woken;
            }
            if self
                .inner
                .signal
                .wait_until(&mut woken, deadline)
                .timed_out()
            {
                if self.is_cancelled() {
                    return WaitOutcome::Cancelled;
                }
                if *woken {
                    *woken = false;
                    return WaitOutcome::Woken;
                }
                return WaitOutcome::TimedOut;
            }
        }
    }

    /// Returns true if both handles refer to the same token.
    #[must_use]
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
