//! Polling Waits
//!
//! Fallback for state that has no callback to hook, only an observable
//! property (a page title, a background color, a favicon being non-null).
//! The predicate is evaluated on a fixed cadence until it holds or the
//! deadline passes.
//!
//! Prefer [`crate::CallbackHelper`] whenever the producer fires an event.

use crate::cancel::CancelToken;
use crate::config::{deadline_after, millis, remaining_until, WaitOptions};
use crate::result::{WaitError, WaitResult};
use std::fmt::Debug;
use std::time::{Duration, Instant};

const DEFAULT_DESCRIPTION: &str = "criteria";

// =============================================================================
// WAIT CONDITION TRAIT
// =============================================================================

/// A reusable, named condition that explains why it does not hold yet
pub trait WaitCondition: Send + Sync {
    /// `Ok` once satisfied, otherwise the reason it is not
    fn evaluate(&self) -> Result<(), String>;

    /// Name used in timeout errors
    fn description(&self) -> String;
}

/// [`WaitCondition`] built from a closure returning a failure message
pub struct Criteria<F> {
    description: String,
    check: F,
}

impl<F> Debug for Criteria<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Criteria").field(&self.description).finish()
    }
}

impl<F> Criteria<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    /// Name `check` for diagnostics
    pub fn new(description: impl Into<String>, check: F) -> Self {
        Self {
            description: description.into(),
            check,
        }
    }
}

impl<F> WaitCondition for Criteria<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    fn evaluate(&self) -> Result<(), String> {
        (self.check)()
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

// =============================================================================
// CRITERIA
// =============================================================================

/// Compare an observed value against the expected one, producing the
/// failure message reported if polling times out.
pub fn check_that<T: PartialEq + Debug>(what: &str, expected: &T, actual: &T) -> Result<(), String> {
    if expected == actual {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?} but was {actual:?}"))
    }
}

// =============================================================================
// POLL OUTCOME
// =============================================================================

/// Result of a satisfied poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Number of predicate evaluations, including the successful one
    pub attempts: usize,
    /// Time from the first evaluation to success
    pub elapsed: Duration,
}

// =============================================================================
// POLLER
// =============================================================================

/// Configurable polling loop
#[derive(Debug, Clone)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    description: Option<String>,
    cancel: Option<CancelToken>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::from_options(&WaitOptions::default())
    }
}

impl Poller {
    /// Create a poller with default timeout and interval
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a poller using the polling settings of `options`
    #[must_use]
    pub fn from_options(options: &WaitOptions) -> Self {
        Self {
            timeout: options.poll_timeout(),
            interval: options.poll_interval(),
            description: None,
            cancel: None,
        }
    }

    /// Set the overall timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the interval between evaluations
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the description used in timeout errors
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Abort with [`WaitError::Interrupted`] once `token` is cancelled
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Overall timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Interval between evaluations
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Description used in errors; `"criteria"` unless one was set
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION)
    }

    pub(crate) const fn has_description(&self) -> bool {
        self.description.is_some()
    }

    /// Poll a boolean predicate
    pub fn until<F>(&self, mut predicate: F) -> WaitResult<PollOutcome>
    where
        F: FnMut() -> bool,
    {
        self.criteria(|| if predicate() { Ok(()) } else { Err(String::new()) })
    }

    /// Poll a [`WaitCondition`], using its description in errors
    pub fn wait_for<C: WaitCondition + ?Sized>(&self, condition: &C) -> WaitResult<PollOutcome> {
        self.clone()
            .with_description(condition.description())
            .criteria(|| condition.evaluate())
    }

    /// Poll criteria that explain their failures; the last message is
    /// reported if the deadline passes
    pub fn criteria<F>(&self, mut criteria: F) -> WaitResult<PollOutcome>
    where
        F: FnMut() -> Result<(), String>,
    {
        self.criteria_within(|_| criteria())
    }

    /// Like [`criteria`](Self::criteria), but each evaluation is told how
    /// much time is left before the deadline
    pub(crate) fn criteria_within<F>(&self, mut criteria: F) -> WaitResult<PollOutcome>
    where
        F: FnMut(Duration) -> Result<(), String>,
    {
        let start = Instant::now();
        let deadline = deadline_after(self.timeout);
        let description = self.description();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let remaining = remaining_until(deadline);
            let last_failure = match criteria(remaining) {
                Ok(()) => {
                    tracing::debug!(%description, attempts, "poll satisfied");
                    return Ok(PollOutcome {
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Err(message) => message,
            };

            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::warn!(%description, attempts, "poll interrupted");
                return Err(WaitError::Interrupted {
                    label: description.to_string(),
                });
            }
            if remaining_until(deadline).is_zero() {
                tracing::warn!(%description, attempts, "poll timed out");
                return Err(WaitError::PollTimeout {
                    description: description.to_string(),
                    attempts,
                    timeout_ms: millis(self.timeout),
                    last_failure: (!last_failure.is_empty()).then_some(last_failure),
                });
            }
            std::thread::sleep(self.interval);
        }
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Poll `predicate` every `interval` until it returns true or `timeout` elapses
pub fn poll_until<F>(predicate: F, timeout: Duration, interval: Duration) -> WaitResult<PollOutcome>
where
    F: FnMut() -> bool,
{
    Poller::new()
        .with_timeout(timeout)
        .with_interval(interval)
        .with_description("predicate")
        .until(predicate)
}

/// Poll criteria with the default polling timeout and interval
pub fn poll_criteria<F>(description: &str, criteria: F) -> WaitResult<PollOutcome>
where
    F: FnMut() -> Result<(), String>,
{
    Poller::new().with_description(description).criteria(criteria)
}

// =============================================================================
// TESTS
// =============================================================================
