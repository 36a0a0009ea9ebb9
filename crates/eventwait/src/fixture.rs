//! Per-Test Wait Fixture
//!
//! Every test owns one [`WaitFixture`]. Helpers, clients and pollers created
//! from it share its options and its cancel token, so dropping the fixture at
//! the end of the test releases any thread still blocked in a wait. Nothing
//! here is process-global; tests running in parallel never share counters.
//!
//! [`ScopedRelease`] replaces finalizer-driven cleanup with a destructor: the
//! release runs exactly once when the guard goes out of scope, and can notify
//! a helper so tests assert the release directly.

use crate::cancel::CancelToken;
use crate::client::RecordingClient;
use crate::config::WaitOptions;
use crate::helper::{CallbackHelper, PayloadHelper};
use crate::poll::Poller;
use crate::result::WaitResult;
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

// =============================================================================
// WAIT FIXTURE
// =============================================================================

/// Scope owning the options and cancel token of one test
#[derive(Debug)]
pub struct WaitFixture {
    id: Uuid,
    name: String,
    options: WaitOptions,
    cancel: CancelToken,
}

impl WaitFixture {
    /// Create a fixture with default options
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), WaitOptions::default())
    }

    /// Create a fixture with explicit options, rejecting unusable ones with
    /// [`WaitError::Config`](crate::WaitError::Config)
    pub fn with_options(name: impl Into<String>, options: WaitOptions) -> WaitResult<Self> {
        options.validate()?;
        Ok(Self::build(name.into(), options))
    }

    /// Create a fixture whose timeouts honour `EVENTWAIT_TIMEOUT_SCALE`
    pub fn from_env(name: impl Into<String>) -> WaitResult<Self> {
        Self::with_options(name, WaitOptions::from_env()?)
    }

    fn build(name: String, options: WaitOptions) -> Self {
        let fixture = Self {
            id: Uuid::new_v4(),
            name,
            options,
            cancel: CancelToken::new(),
        };
        tracing::debug!(fixture = %fixture.name, id = %fixture.id, "fixture set up");
        fixture
    }

    /// Unique fixture id, included in log lines
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Fixture name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options shared by everything created from this fixture
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Token cancelled when the fixture is interrupted or dropped
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Create a callback helper bound to this fixture
    #[must_use]
    pub fn helper(&self, label: impl Into<String>) -> CallbackHelper {
        self.payload_helper(label)
    }

    /// Create a payload helper bound to this fixture
    #[must_use]
    pub fn payload_helper<T: Clone + Send + 'static>(
        &self,
        label: impl Into<String>,
    ) -> PayloadHelper<T> {
        PayloadHelper::build(label.into(), self.options, Some(self.cancel.clone()), false)
    }

    /// Create a payload helper that keeps every payload
    #[must_use]
    pub fn recording_helper<T: Clone + Send + 'static>(
        &self,
        label: impl Into<String>,
    ) -> PayloadHelper<T> {
        PayloadHelper::build(label.into(), self.options, Some(self.cancel.clone()), true)
    }

    /// Create a recording client bound to this fixture
    #[must_use]
    pub fn client(&self) -> RecordingClient {
        RecordingClient::build(self.options, Some(self.cancel.clone()))
    }

    /// Create a poller with this fixture's polling options
    #[must_use]
    pub fn poller(&self, description: impl Into<String>) -> Poller {
        Poller::from_options(&self.options)
            .with_description(description)
            .with_cancel(self.cancel.clone())
    }

    /// Interrupt every wait created from this fixture
    pub fn interrupt(&self) {
        tracing::warn!(fixture = %self.name, id = %self.id, "fixture interrupted");
        self.cancel.cancel();
    }

    /// Whether the fixture has been interrupted
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for WaitFixture {
    fn drop(&mut self) {
        self.cancel.cancel();
        tracing::debug!(fixture = %self.name, id = %self.id, "fixture torn down");
    }
}

// =============================================================================
// SCOPED RELEASE
// =============================================================================

type Release<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Owns a resource and releases it exactly once when dropped
pub struct ScopedRelease<T> {
    value: T,
    release: Option<Release<T>>,
    released: Option<CallbackHelper>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for ScopedRelease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedRelease")
            .field("value", &self.value)
            .field("pending", &self.release.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> ScopedRelease<T> {
    /// Wrap `value`; `release` runs on drop
    pub fn new<F>(value: T, release: F) -> Self
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        Self {
            value,
            release: Some(Box::new(release)),
            released: None,
        }
    }

    /// Notify `helper` once the release has run
    #[must_use]
    pub fn notify_on_release(mut self, helper: CallbackHelper) -> Self {
        self.released = Some(helper);
        self
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release(&mut self.value);
            if let Some(helper) = &self.released {
                helper.notify_called();
            }
        }
    }
}

impl<T> Deref for ScopedRelease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for ScopedRelease<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for ScopedRelease<T> {
    fn drop(&mut self) {
        self.run_release();
    }
}

// =============================================================================
// TESTS
// =============================================================================
