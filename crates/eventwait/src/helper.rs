//! Callback Helpers
//!
//! Bridge callbacks fired on an engine or UI thread into blocking waits on the
//! test thread. A producer calls [`PayloadHelper::notify_with`] (or
//! [`CallbackHelper::notify_called`]) each time the tracked event fires; the
//! test captures [`call_count`](PayloadHelper::call_count) as a baseline
//! *before* triggering the action and then blocks in
//! [`wait_for_callback`](PayloadHelper::wait_for_callback).
//!
//! ```
//! use eventwait::CallbackHelper;
//! use std::time::Duration;
//!
//! let on_page_finished = CallbackHelper::named("onPageFinished");
//! let baseline = on_page_finished.call_count();
//!
//! let producer = on_page_finished.clone();
//! std::thread::spawn(move || {
//!     producer.notify_called();
//!     producer.notify_called();
//! });
//!
//! on_page_finished
//!     .wait_for_callback(baseline, 2, Duration::from_secs(5))
//!     .unwrap();
//! assert_eq!(on_page_finished.call_count(), 2);
//! ```

use crate::cancel::{CancelToken, Wake};
use crate::config::{deadline_after, millis, remaining_until, WaitOptions};
use crate::result::{WaitError, WaitResult};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Label used by helpers created without a name
pub const DEFAULT_LABEL: &str = "callback";

/// Helper for events that carry no data
pub type CallbackHelper = PayloadHelper<()>;

// =============================================================================
// WAIT OUTCOME
// =============================================================================

/// Result of a satisfied wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Call count observed when the wait returned
    pub count: usize,
    /// Time spent blocked
    pub elapsed: Duration,
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct State<T> {
    count: usize,
    payload: Option<T>,
    history: Option<Vec<T>>,
    failure: Option<String>,
    last_waited: usize,
}

struct Shared<T> {
    label: String,
    options: WaitOptions,
    cancel: Option<CancelToken>,
    state: Mutex<State<T>>,
    cond: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Wake for Shared<T> {
    fn wake(&self) {
        let _state = self.lock();
        self.cond.notify_all();
    }
}

// =============================================================================
// PAYLOAD HELPER
// =============================================================================

/// Thread-safe call counter with a payload slot and blocking waits.
///
/// Cloning yields another handle to the same counter, so the producer side
/// (a mock client, a JS bridge object) and the test can each hold one.
pub struct PayloadHelper<T = ()> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PayloadHelper<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for PayloadHelper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadHelper")
            .field("label", &self.shared.label)
            .field("count", &self.shared.lock().count)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Default for PayloadHelper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadHelper<()> {
    /// Record one occurrence of the event
    pub fn notify_called(&self) {
        self.notify_with(());
    }
}

impl<T: Clone + Send + 'static> PayloadHelper<T> {
    /// Create an unnamed helper with default options
    #[must_use]
    pub fn new() -> Self {
        Self::named(DEFAULT_LABEL)
    }

    /// Create a helper labelled for diagnostics
    #[must_use]
    pub fn named(label: impl Into<String>) -> Self {
        Self::build(label.into(), WaitOptions::default(), None, false)
    }

    /// Create a helper that keeps every payload, not just the latest
    #[must_use]
    pub fn recording(label: impl Into<String>) -> Self {
        Self::build(label.into(), WaitOptions::default(), None, true)
    }

    /// Create a helper with explicit options
    #[must_use]
    pub fn with_options(label: impl Into<String>, options: WaitOptions) -> Self {
        Self::build(label.into(), options, None, false)
    }

    pub(crate) fn build(
        label: String,
        options: WaitOptions,
        cancel: Option<CancelToken>,
        recording: bool,
    ) -> Self {
        let shared = Arc::new(Shared {
            label,
            options,
            cancel,
            state: Mutex::new(State {
                count: 0,
                payload: None,
                history: recording.then(Vec::new),
                failure: None,
                last_waited: 0,
            }),
            cond: Condvar::new(),
        });
        if let Some(token) = &shared.cancel {
            let weak: Weak<dyn Wake> = Arc::downgrade(&shared) as Weak<dyn Wake>;
            token.register(weak);
        }
        Self { shared }
    }

    /// Diagnostic label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Options used by the default-timeout waits
    #[must_use]
    pub fn options(&self) -> &WaitOptions {
        &self.shared.options
    }

    /// Current number of recorded occurrences. Never blocks on a wait.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.shared.lock().count
    }

    /// Record one occurrence carrying `payload` and wake all waiters
    pub fn notify_with(&self, payload: T) {
        let mut state = self.shared.lock();
        state.count += 1;
        if let Some(history) = state.history.as_mut() {
            history.push(payload.clone());
        }
        state.payload = Some(payload);
        tracing::trace!(label = %self.shared.label, count = state.count, "callback notified");
        self.shared.cond.notify_all();
    }

    /// Report that the producer failed; pending and later waits fail with `reason`
    pub fn notify_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.shared.lock();
        tracing::warn!(label = %self.shared.label, %reason, "callback reported failure");
        if state.failure.is_none() {
            state.failure = Some(reason);
        }
        self.shared.cond.notify_all();
    }

    /// Block until the count reaches `baseline + calls`, or fail after `timeout`
    pub fn wait_for_callback(
        &self,
        baseline: usize,
        calls: usize,
        timeout: Duration,
    ) -> WaitResult<WaitOutcome> {
        let start = Instant::now();
        let state = self.wait_locked(baseline, calls, timeout)?;
        Ok(WaitOutcome {
            count: state.count,
            elapsed: start.elapsed(),
        })
    }

    /// Wait for one call past `baseline` with the default timeout
    pub fn wait_for_callback_from(&self, baseline: usize) -> WaitResult<WaitOutcome> {
        self.wait_for_callback(baseline, 1, self.shared.options.timeout())
    }

    /// Wait for `calls` calls past `baseline` with the default timeout
    pub fn wait_for_calls(&self, baseline: usize, calls: usize) -> WaitResult<WaitOutcome> {
        self.wait_for_callback(baseline, calls, self.shared.options.timeout())
    }

    /// Wait until the event has fired at least once since construction
    pub fn wait_for_first(&self) -> WaitResult<WaitOutcome> {
        self.wait_for_callback_from(0)
    }

    /// Wait for the first call after the count the previous wait was satisfied at
    pub fn wait_for_next(&self) -> WaitResult<WaitOutcome> {
        let last = self.shared.lock().last_waited;
        self.wait_for_callback_from(last)
    }

    /// Wait for the first call and fail if the event fired more than once
    pub fn wait_for_only(&self) -> WaitResult<WaitOutcome> {
        let outcome = self.wait_for_first()?;
        self.assert_call_count(1)?;
        Ok(outcome)
    }

    /// Fail with [`WaitError::UnexpectedCall`] unless the count equals `expected`
    pub fn assert_call_count(&self, expected: usize) -> WaitResult<()> {
        let actual = self.call_count();
        if actual == expected {
            Ok(())
        } else {
            tracing::warn!(label = %self.shared.label, expected, actual, "unexpected call count");
            Err(WaitError::UnexpectedCall {
                label: self.shared.label.clone(),
                expected,
                actual,
            })
        }
    }

    /// Latest payload, if any call has been recorded
    #[must_use]
    pub fn payload(&self) -> Option<T> {
        self.shared.lock().payload.clone()
    }

    /// Latest payload, provided the count has advanced past `baseline`
    pub fn payload_after(&self, baseline: usize) -> WaitResult<T> {
        let state = self.shared.lock();
        self.fresh_payload(&state, baseline)
    }

    /// Wait for one call past `baseline` and read its payload under the same lock
    pub fn wait_for_payload(&self, baseline: usize, timeout: Duration) -> WaitResult<T> {
        let state = self.wait_locked(baseline, 1, timeout)?;
        self.fresh_payload(&state, baseline)
    }

    /// Every payload in arrival order; empty unless created with [`recording`](Self::recording)
    #[must_use]
    pub fn history(&self) -> Vec<T> {
        self.shared.lock().history.clone().unwrap_or_default()
    }

    fn fresh_payload(&self, state: &State<T>, baseline: usize) -> WaitResult<T> {
        match &state.payload {
            Some(payload) if state.count > baseline => Ok(payload.clone()),
            _ => Err(WaitError::UnexpectedCall {
                label: self.shared.label.clone(),
                expected: baseline.saturating_add(1),
                actual: state.count,
            }),
        }
    }

    fn wait_locked(
        &self,
        baseline: usize,
        calls: usize,
        timeout: Duration,
    ) -> WaitResult<MutexGuard<'_, State<T>>> {
        let shared = &*self.shared;
        let target = baseline.saturating_add(calls);
        let deadline = deadline_after(timeout);
        let mut state = shared.lock();

        loop {
            if let Some(reason) = &state.failure {
                return Err(WaitError::Failed {
                    label: shared.label.clone(),
                    reason: reason.clone(),
                });
            }
            if state.count >= target {
                state.last_waited = state.last_waited.max(target);
                tracing::debug!(label = %shared.label, baseline, target, "wait satisfied");
                return Ok(state);
            }
            if shared.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::warn!(label = %shared.label, baseline, target, "wait interrupted");
                return Err(WaitError::Interrupted {
                    label: shared.label.clone(),
                });
            }
            let remaining = remaining_until(deadline);
            if remaining.is_zero() {
                tracing::warn!(
                    label = %shared.label,
                    baseline,
                    target,
                    observed = state.count,
                    "wait timed out"
                );
                return Err(WaitError::Timeout {
                    label: shared.label.clone(),
                    baseline,
                    target,
                    observed: state.count,
                    timeout_ms: millis(timeout),
                });
            }
            state = match deadline {
                Some(_) => {
                    shared
                        .cond
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => shared.cond.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
