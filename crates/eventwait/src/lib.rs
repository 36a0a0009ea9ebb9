//! eventwait: blocking waits on events fired from other threads
//!
//! Tests of embedded, callback-driven components trigger an action on one
//! thread and learn about its effects through callbacks fired on another.
//! This crate turns those callbacks into synchronous assertions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      eventwait Architecture                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐  dispatch  ┌────────────────┐  notify_with      │
//! │   │ UiThread   │──────────►│ RecordingClient │────────────┐      │
//! │   │ (producer) │           │ (EventKind map) │            ▼      │
//! │   └────────────┘           └────────────────┘   ┌───────────────┐│
//! │                                                 │ PayloadHelper ││
//! │   ┌────────────┐  wait_for_callback(baseline,n) │ count+Condvar ││
//! │   │ Test       │───────────────────────────────►└───────────────┘│
//! │   │ (consumer) │  poll_until(predicate)     ┌────────┐           │
//! │   └────────────┘───────────────────────────►│ Poller │           │
//! │         │                                   └────────┘           │
//! │         └── WaitFixture: options + CancelToken, cancelled on drop│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use eventwait::prelude::*;
//! use std::time::Duration;
//!
//! let fixture = WaitFixture::new("load_page");
//! let on_page_finished = fixture.helper("onPageFinished");
//!
//! let baseline = on_page_finished.call_count();
//! let producer = on_page_finished.clone();
//! std::thread::spawn(move || producer.notify_called());
//!
//! on_page_finished
//!     .wait_for_callback(baseline, 1, Duration::from_secs(5))
//!     .unwrap();
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod cancel;
mod client;
mod config;
mod fixture;
mod helper;
mod logging;
mod pending;
mod poll;
mod result;
mod ui_thread;

pub use cancel::CancelToken;
pub use client::{
    ClientEvent, ConsoleLevel, CountSnapshot, EventDispatcher, EventKind, EventSink,
    RecordingClient,
};
pub use config::{
    WaitOptions, DEFAULT_CALLBACK_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_TIMEOUT_MS,
    TIMEOUT_SCALE_ENV,
};
pub use fixture::{ScopedRelease, WaitFixture};
pub use helper::{CallbackHelper, PayloadHelper, WaitOutcome, DEFAULT_LABEL};
pub use logging::{init_test_logging, DEFAULT_FILTER};
pub use pending::PendingResult;
pub use poll::{
    check_that, poll_criteria, poll_until, Criteria, PollOutcome, Poller, WaitCondition,
};
pub use result::{WaitError, WaitResult};
pub use ui_thread::UiThread;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        check_that, poll_until, CallbackHelper, CancelToken, ClientEvent, EventKind, EventSink,
        PayloadHelper, PendingResult, Poller, RecordingClient, ScopedRelease, UiThread,
        WaitError, WaitFixture, WaitOptions, WaitResult,
    };
}
