//! Single-value result slot filled by a callback on another thread.
//!
//! Used where a callback delivers exactly one answer, such as a find-in-page
//! result listener reporting the final match count. A second `set` is a
//! contract violation and is reported instead of silently overwriting.

use crate::config::{deadline_after, millis, remaining_until};
use crate::result::{WaitError, WaitResult};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct Slot<T> {
    value: Option<T>,
    sets: usize,
}

struct Inner<T> {
    label: String,
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A value that will be provided exactly once
pub struct PendingResult<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PendingResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("label", &self.inner.label)
            .field("is_set", &self.inner.lock().value.is_some())
            .finish()
    }
}

impl<T: Clone> PendingResult<T> {
    /// Create an empty result slot
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                slot: Mutex::new(Slot {
                    value: None,
                    sets: 0,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Provide the value. Fails with [`WaitError::UnexpectedCall`] if it was
    /// already provided; the first value is kept.
    pub fn set(&self, value: T) -> WaitResult<()> {
        let mut slot = self.inner.lock();
        slot.sets += 1;
        if slot.value.is_some() {
            tracing::warn!(label = %self.inner.label, sets = slot.sets, "result set twice");
            return Err(WaitError::UnexpectedCall {
                label: self.inner.label.clone(),
                expected: 1,
                actual: slot.sets,
            });
        }
        slot.value = Some(value);
        self.inner.cond.notify_all();
        Ok(())
    }

    /// Whether a value has been provided
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.lock().value.is_some()
    }

    /// The value, if already provided
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.inner.lock().value.clone()
    }

    /// Block until the value is provided or `timeout` elapses
    pub fn get(&self, timeout: Duration) -> WaitResult<T> {
        let deadline = deadline_after(timeout);
        let mut slot = self.inner.lock();
        loop {
            if let Some(value) = &slot.value {
                return Ok(value.clone());
            }
            let remaining = remaining_until(deadline);
            if remaining.is_zero() {
                return Err(WaitError::Timeout {
                    label: self.inner.label.clone(),
                    baseline: 0,
                    target: 1,
                    observed: 0,
                    timeout_ms: millis(timeout),
                });
            }
            slot = match deadline {
                Some(_) => {
                    self.inner
                        .cond
                        .wait_timeout(slot, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .cond
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    struct FindResult {
        active_match: usize,
        matches: usize,
    }

    #[test]
    fn test_get_after_set() {
        let result = PendingResult::new("find");
        result
            .set(FindResult {
                active_match: 0,
                matches: 3,
            })
            .unwrap();
        assert!(result.is_set());
        let value = result.get(Duration::ZERO).unwrap();
        assert_eq!((value.active_match, value.matches), (0, 3));
    }

    #[test]
    fn test_get_blocks_until_set_from_other_thread() {
        let result = PendingResult::new("find");
        let producer = result.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer
                .set(FindResult {
                    active_match: 1,
                    matches: 2,
                })
                .unwrap();
        });
        let value = result.get(Duration::from_secs(5)).unwrap();
        assert_eq!(
            value,
            FindResult {
                active_match: 1,
                matches: 2
            }
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_get_times_out() {
        let result = PendingResult::<u32>::new("visualState");
        let start = Instant::now();
        let err = result.get(Duration::from_millis(50)).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(err.is_timeout());
        assert!(result.try_get().is_none());
    }

    #[test]
    fn test_unbounded_get() {
        let result = PendingResult::new("visualState");
        result.set(9u64).unwrap();
        assert_eq!(result.get(Duration::MAX).unwrap(), 9);

        let later = PendingResult::new("visualState");
        let producer = later.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.set(3u64).unwrap();
        });
        assert_eq!(later.get(Duration::MAX).unwrap(), 3);
        handle.join().unwrap();
    }

    #[test]
    fn test_second_set_rejected_first_kept() {
        let result = PendingResult::new("find");
        result.set(1u32).unwrap();
        let err = result.set(2).unwrap_err();
        assert!(matches!(
            err,
            WaitError::UnexpectedCall {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(result.try_get(), Some(1));
    }
}
