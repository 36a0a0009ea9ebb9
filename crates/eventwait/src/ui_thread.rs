//! Dedicated UI thread.
//!
//! Embedded components expect every mutating call on one thread. [`UiThread`]
//! owns that thread: tests post work to it, run closures on it and block for
//! the result, or poll a predicate that must be evaluated there.

use crate::config::{millis, WaitOptions};
use crate::poll::{PollOutcome, Poller};
use crate::result::{WaitError, WaitResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a running UI thread. Dropping it stops and joins the thread.
pub struct UiThread {
    name: String,
    thread_id: ThreadId,
    timeout: Duration,
    sender: Option<Sender<Task>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for UiThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiThread")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("running", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

impl UiThread {
    /// Start a named UI thread
    pub fn spawn(name: impl Into<String>) -> WaitResult<Self> {
        let name = name.into();
        let (sender, receiver) = channel::<Task>();
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(thread = %thread_name, "ui thread started");
                for task in receiver {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::warn!(thread = %thread_name, "posted task panicked");
                    }
                }
                tracing::debug!(thread = %thread_name, "ui thread stopped");
            })?;
        Ok(Self {
            name,
            thread_id: handle.thread().id(),
            timeout: WaitOptions::default().timeout(),
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Set how long [`run_blocking`](Self::run_blocking) waits for a result
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Thread name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default timeout of [`run_blocking`](Self::run_blocking)
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the caller is running on this UI thread
    #[must_use]
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Queue `task` to run on the UI thread without waiting for it
    pub fn post<F>(&self, task: F) -> WaitResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .ok_or_else(|| self.panicked())?
            .send(Box::new(task))
            .map_err(|_| self.panicked())
    }

    /// Run `f` on the UI thread and block until it returns its value, or
    /// until this thread's default timeout passes
    pub fn run_blocking<F, R>(&self, f: F) -> WaitResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run_blocking_timeout(f, self.timeout)
    }

    /// Run `f` on the UI thread and block for at most `timeout`.
    ///
    /// Called from the UI thread itself, `f` runs inline. On timeout the task
    /// stays queued and its result is discarded.
    pub fn run_blocking_timeout<F, R>(&self, f: F, timeout: Duration) -> WaitResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return catch_unwind(AssertUnwindSafe(f)).map_err(|_| self.panicked());
        }
        let (reply, result) = channel();
        self.post(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            let _ = reply.send(outcome);
        })?;
        match result.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(thread = %self.name, ?timeout, "ui thread did not answer in time");
                Err(WaitError::Timeout {
                    label: self.name.clone(),
                    baseline: 0,
                    target: 1,
                    observed: 0,
                    timeout_ms: millis(timeout),
                })
            }
            Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => Err(self.panicked()),
        }
    }

    /// Poll `predicate` with `poller`'s cadence, evaluating it on the UI thread.
    ///
    /// Each evaluation waits only for the time left before the poller's
    /// deadline, so a busy UI thread ends the poll with
    /// [`WaitError::PollTimeout`] on time. Without a description the error
    /// names this thread.
    pub fn poll_ui_thread<F>(&self, poller: &Poller, predicate: F) -> WaitResult<PollOutcome>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let labelled;
        let poller = if poller.has_description() {
            poller
        } else {
            labelled = poller
                .clone()
                .with_description(format!("predicate on ui thread '{}'", self.name));
            &labelled
        };
        let predicate = Arc::new(predicate);
        poller.criteria_within(|remaining| {
            let predicate = Arc::clone(&predicate);
            match self.run_blocking_timeout(move || (*predicate)(), remaining) {
                Ok(true) => Ok(()),
                Ok(false) => Err(String::new()),
                Err(e) if e.is_timeout() => Err(format!("ui thread '{}' is busy", self.name)),
                Err(e) => Err(e.to_string()),
            }
        })
    }

    fn panicked(&self) -> WaitError {
        WaitError::TaskPanicked {
            thread: self.name.clone(),
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
