//! Interruption of blocked waits.
//!
//! A [`CancelToken`] is shared between a test fixture and every helper it
//! creates. Cancelling it wakes all helpers that registered with it, and any
//! thread blocked in a wait on them returns [`crate::WaitError::Interrupted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Something blocked threads can be woken through
pub(crate) trait Wake: Send + Sync {
    /// Wake every thread waiting on this object
    fn wake(&self);
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    watchers: Mutex<Vec<Weak<dyn Wake>>>,
}

/// Shared interruption flag for a group of waits
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancelToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the token and wake every registered waiter. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let watchers = std::mem::take(
            &mut *self
                .inner
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        tracing::debug!(watchers = watchers.len(), "cancel token fired");
        for watcher in watchers.iter().filter_map(Weak::upgrade) {
            watcher.wake();
        }
    }

    /// Register a watcher to be woken on cancellation.
    ///
    /// Registering on an already cancelled token wakes the watcher at once.
    pub(crate) fn register(&self, watcher: Weak<dyn Wake>) {
        let mut watchers = self
            .inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            drop(watchers);
            if let Some(watcher) = watcher.upgrade() {
                watcher.wake();
            }
            return;
        }
        watchers.retain(|w| w.strong_count() > 0);
        watchers.push(watcher);
    }

    #[cfg(test)]
    fn watcher_count(&self) -> usize {
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
