//! In-flight work tracking for graceful shutdown.
//!
//! # Responsibilities
//! - Count units of work that must finish before facilities are torn down
//! - Refuse new work once shutdown has begun
//! - Notify the shutdown path when the count reaches zero
//!
//! # Design Decisions
//! - Guards decrement on drop, so early returns and panics still release
//! - Entry and close are serialized through the watch channel's lock, so no
//!   guard can slip in after the shutdown path observed zero

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    count: watch::Sender<usize>,
    closed: AtomicBool,
}

/// Shared handle to the process critical section.
#[derive(Debug, Clone)]
pub struct CriticalSection {
    inner: Arc<Inner>,
}

impl CriticalSection {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                count,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Mark a unit of work as in flight.
    ///
    /// Returns `None` once shutdown has begun; callers should reject the work.
    pub fn try_enter(&self) -> Option<CriticalGuard> {
        let closed = &self.inner.closed;
        let entered = self.inner.count.send_if_modified(|count| {
            if closed.load(Ordering::SeqCst) {
                false
            } else {
                *count += 1;
                true
            }
        });

        entered.then(|| CriticalGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of in-flight units.
    pub fn active(&self) -> usize {
        *self.inner.count.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.active() > 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Refuse further entries.
    pub(crate) fn close(&self) {
        let closed = &self.inner.closed;
        self.inner.count.send_modify(|_| closed.store(true, Ordering::SeqCst));
    }

    /// Resolve once no work is in flight. No timeout.
    pub async fn wait_clear(&self) {
        let mut rx = self.inner.count.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its unit of work when dropped.
#[derive(Debug)]
pub struct CriticalGuard {
    inner: Arc<Inner>,
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        self.inner.count.send_modify(|count| *count = count.saturating_sub(1));
    }
}
