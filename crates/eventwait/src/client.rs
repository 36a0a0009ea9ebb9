//! Mock Contents Client
//!
//! The embedded engine reports progress through one callback per event kind.
//! Here each callback is a variant of [`ClientEvent`], and a client is a
//! dispatch table from [`EventKind`] to handlers. Kinds without a handler are
//! ignored, so a test only wires the callbacks it cares about.
//!
//! [`RecordingClient`] is the usual test double: it owns one
//! [`PayloadHelper`] per kind and records every event in arrival order.
//!
//! ```
//! use eventwait::{ClientEvent, EventKind, EventSink, RecordingClient};
//! use std::sync::Arc;
//!
//! let client = Arc::new(RecordingClient::new());
//! let before = client.snapshot();
//!
//! let engine: Arc<dyn EventSink> = client.clone();
//! std::thread::spawn(move || {
//!     engine.dispatch(&ClientEvent::page_started("about:blank"));
//!     engine.dispatch(&ClientEvent::page_finished("about:blank"));
//! });
//!
//! client.wait_for(EventKind::PageFinished, &before, 1).unwrap();
//! assert_eq!(client.snapshot().delta(&before, EventKind::PageStarted), 1);
//! ```

use crate::cancel::CancelToken;
use crate::config::WaitOptions;
use crate::helper::{PayloadHelper, WaitOutcome};
use crate::result::WaitResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

// =============================================================================
// EVENTS
// =============================================================================

/// Console message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsoleLevel {
    /// Tip
    Tip,
    /// Log
    Log,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Debug
    Debug,
}

/// One callback invocation from the embedded engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Main frame navigation started
    PageStarted {
        /// Page URL
        url: String,
    },
    /// Main frame finished loading
    PageFinished {
        /// Page URL
        url: String,
    },
    /// A load failed
    ReceivedError {
        /// Failing URL
        url: String,
        /// Net error code
        error_code: i32,
        /// Error description
        description: String,
    },
    /// Document title changed
    ReceivedTitle {
        /// New title
        title: String,
    },
    /// Favicon decoded
    ReceivedIcon {
        /// Icon width in pixels
        width: u32,
        /// Icon height in pixels
        height: u32,
    },
    /// `console.*` call from the page
    ConsoleMessage {
        /// Severity
        level: ConsoleLevel,
        /// Message text
        message: String,
        /// Script URL
        source_id: String,
        /// Line number
        line: u32,
    },
    /// Page requested a permission
    PermissionRequest {
        /// Requesting origin
        origin: String,
        /// Requested resources
        resources: Vec<String>,
    },
    /// Auto-login request
    LoginRequest {
        /// Login realm
        realm: String,
        /// Account, if one was suggested
        account: Option<String>,
        /// Opaque login arguments
        args: String,
    },
    /// Find-in-page progress
    FindResult {
        /// Index of the active match
        active_match_ordinal: usize,
        /// Matches found so far
        number_of_matches: usize,
        /// Whether counting has finished
        is_done_counting: bool,
    },
    /// Download requested
    DownloadStart {
        /// Download URL
        url: String,
        /// User agent used for the request
        user_agent: String,
        /// Content-Disposition header
        content_disposition: String,
        /// MIME type
        mime_type: String,
        /// Content length in bytes
        content_length: u64,
    },
    /// Renderer stopped responding
    RendererUnresponsive,
    /// Renderer is responsive again
    RendererResponsive,
    /// A visual state request was flushed to the screen
    VisualStateFlushed {
        /// Request identifier passed by the test
        request_id: u64,
    },
    /// A histogram sample was recorded
    HistogramSample {
        /// Histogram name
        name: String,
        /// Sample value
        sample: i64,
    },
}

impl ClientEvent {
    /// Create a page started event
    #[must_use]
    pub fn page_started(url: &str) -> Self {
        Self::PageStarted {
            url: url.to_string(),
        }
    }

    /// Create a page finished event
    #[must_use]
    pub fn page_finished(url: &str) -> Self {
        Self::PageFinished {
            url: url.to_string(),
        }
    }

    /// Create a received error event
    #[must_use]
    pub fn received_error(url: &str, error_code: i32, description: &str) -> Self {
        Self::ReceivedError {
            url: url.to_string(),
            error_code,
            description: description.to_string(),
        }
    }

    /// Create a title event
    #[must_use]
    pub fn title(title: &str) -> Self {
        Self::ReceivedTitle {
            title: title.to_string(),
        }
    }

    /// Create a console message event
    #[must_use]
    pub fn console(level: ConsoleLevel, message: &str) -> Self {
        Self::ConsoleMessage {
            level,
            message: message.to_string(),
            source_id: String::new(),
            line: 0,
        }
    }

    /// Create a find result event
    #[must_use]
    pub fn find_result(active: usize, matches: usize, done: bool) -> Self {
        Self::FindResult {
            active_match_ordinal: active,
            number_of_matches: matches,
            is_done_counting: done,
        }
    }

    /// Create a histogram sample event
    #[must_use]
    pub fn histogram(name: &str, sample: i64) -> Self {
        Self::HistogramSample {
            name: name.to_string(),
            sample,
        }
    }

    /// The kind of callback this event came from
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::PageStarted { .. } => EventKind::PageStarted,
            Self::PageFinished { .. } => EventKind::PageFinished,
            Self::ReceivedError { .. } => EventKind::ReceivedError,
            Self::ReceivedTitle { .. } => EventKind::ReceivedTitle,
            Self::ReceivedIcon { .. } => EventKind::ReceivedIcon,
            Self::ConsoleMessage { .. } => EventKind::ConsoleMessage,
            Self::PermissionRequest { .. } => EventKind::PermissionRequest,
            Self::LoginRequest { .. } => EventKind::LoginRequest,
            Self::FindResult { .. } => EventKind::FindResult,
            Self::DownloadStart { .. } => EventKind::DownloadStart,
            Self::RendererUnresponsive => EventKind::RendererUnresponsive,
            Self::RendererResponsive => EventKind::RendererResponsive,
            Self::VisualStateFlushed { .. } => EventKind::VisualStateFlushed,
            Self::HistogramSample { .. } => EventKind::HistogramSample,
        }
    }
}

/// Callback kind, one per [`ClientEvent`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `onPageStarted`
    PageStarted,
    /// `onPageFinished`
    PageFinished,
    /// `onReceivedError`
    ReceivedError,
    /// `onReceivedTitle`
    ReceivedTitle,
    /// `onReceivedIcon`
    ReceivedIcon,
    /// `onConsoleMessage`
    ConsoleMessage,
    /// `onPermissionRequest`
    PermissionRequest,
    /// `onReceivedLoginRequest`
    LoginRequest,
    /// `onFindResultReceived`
    FindResult,
    /// `onDownloadStart`
    DownloadStart,
    /// `onRendererUnresponsive`
    RendererUnresponsive,
    /// `onRendererResponsive`
    RendererResponsive,
    /// `onVisualStateFlushed`
    VisualStateFlushed,
    /// `onHistogramSample`
    HistogramSample,
}

impl EventKind {
    /// Every kind
    pub const ALL: [Self; 14] = [
        Self::PageStarted,
        Self::PageFinished,
        Self::ReceivedError,
        Self::ReceivedTitle,
        Self::ReceivedIcon,
        Self::ConsoleMessage,
        Self::PermissionRequest,
        Self::LoginRequest,
        Self::FindResult,
        Self::DownloadStart,
        Self::RendererUnresponsive,
        Self::RendererResponsive,
        Self::VisualStateFlushed,
        Self::HistogramSample,
    ];

    /// Callback name, used as the helper label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PageStarted => "onPageStarted",
            Self::PageFinished => "onPageFinished",
            Self::ReceivedError => "onReceivedError",
            Self::ReceivedTitle => "onReceivedTitle",
            Self::ReceivedIcon => "onReceivedIcon",
            Self::ConsoleMessage => "onConsoleMessage",
            Self::PermissionRequest => "onPermissionRequest",
            Self::LoginRequest => "onReceivedLoginRequest",
            Self::FindResult => "onFindResultReceived",
            Self::DownloadStart => "onDownloadStart",
            Self::RendererUnresponsive => "onRendererUnresponsive",
            Self::RendererResponsive => "onRendererResponsive",
            Self::VisualStateFlushed => "onVisualStateFlushed",
            Self::HistogramSample => "onHistogramSample",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Receiver of engine callbacks
pub trait EventSink: Send + Sync {
    /// Deliver one callback
    fn dispatch(&self, event: &ClientEvent);
}

type Handler = Box<dyn Fn(&ClientEvent) + Send + Sync>;

/// Dispatch table from event kind to handlers
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher; every kind is a no-op
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`; handlers run in registration order
    #[must_use]
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Whether any handler is registered for `kind`
    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handlers for the event's kind, returning how many ran
    pub fn run(&self, event: &ClientEvent) -> usize {
        self.handlers.get(&event.kind()).map_or(0, |handlers| {
            for handler in handlers {
                handler(event);
            }
            handlers.len()
        })
    }
}

impl EventSink for EventDispatcher {
    fn dispatch(&self, event: &ClientEvent) {
        self.run(event);
    }
}

// =============================================================================
// COUNT SNAPSHOT
// =============================================================================

/// Call counts of every kind, captured together as baselines
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CountSnapshot {
    counts: HashMap<EventKind, usize>,
}

impl CountSnapshot {
    /// Count for `kind` at capture time
    #[must_use]
    pub fn get(&self, kind: EventKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Calls of `kind` between `earlier` and this snapshot
    #[must_use]
    pub fn delta(&self, earlier: &Self, kind: EventKind) -> usize {
        self.get(kind).saturating_sub(earlier.get(kind))
    }
}

// =============================================================================
// RECORDING CLIENT
// =============================================================================

/// Client that counts and records every callback
pub struct RecordingClient {
    helpers: HashMap<EventKind, PayloadHelper<ClientEvent>>,
    limits: HashMap<EventKind, usize>,
    extra: EventDispatcher,
    log: Mutex<Vec<ClientEvent>>,
}

impl std::fmt::Debug for RecordingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingClient")
            .field("events", &self.lock_log().len())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Default for RecordingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingClient {
    /// Create a client with default wait options
    #[must_use]
    pub fn new() -> Self {
        Self::build(WaitOptions::default(), None)
    }

    /// Create a client whose helpers use `options`
    #[must_use]
    pub fn with_options(options: WaitOptions) -> Self {
        Self::build(options, None)
    }

    pub(crate) fn build(options: WaitOptions, cancel: Option<CancelToken>) -> Self {
        let helpers = EventKind::ALL
            .iter()
            .map(|&kind| {
                let helper =
                    PayloadHelper::build(kind.as_str().to_string(), options, cancel.clone(), true);
                (kind, helper)
            })
            .collect();
        Self {
            helpers,
            limits: HashMap::new(),
            extra: EventDispatcher::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Fail waits on `kind` once it fires more than `max` times
    #[must_use]
    pub fn expect_at_most(mut self, kind: EventKind, max: usize) -> Self {
        self.limits.insert(kind, max);
        self
    }

    /// Run `handler` after recording each event of `kind`
    #[must_use]
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.extra = self.extra.on(kind, handler);
        self
    }

    /// Helper tracking `kind`
    #[must_use]
    pub fn helper(&self, kind: EventKind) -> &PayloadHelper<ClientEvent> {
        &self.helpers[&kind]
    }

    /// Current count of `kind`
    #[must_use]
    pub fn call_count(&self, kind: EventKind) -> usize {
        self.helper(kind).call_count()
    }

    /// Capture baselines for every kind
    #[must_use]
    pub fn snapshot(&self) -> CountSnapshot {
        CountSnapshot {
            counts: self
                .helpers
                .iter()
                .map(|(&kind, helper)| (kind, helper.call_count()))
                .collect(),
        }
    }

    /// Wait for `calls` more calls of `kind` past its count in `baseline`
    pub fn wait_for(
        &self,
        kind: EventKind,
        baseline: &CountSnapshot,
        calls: usize,
    ) -> WaitResult<WaitOutcome> {
        self.helper(kind).wait_for_calls(baseline.get(kind), calls)
    }

    /// Every event in arrival order
    #[must_use]
    pub fn events(&self) -> Vec<ClientEvent> {
        self.lock_log().clone()
    }

    /// Events in arrival order as JSON, for failure diagnostics
    pub fn events_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.lock_log())
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<ClientEvent>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingClient {
    fn dispatch(&self, event: &ClientEvent) {
        let kind = event.kind();
        self.lock_log().push(event.clone());
        let helper = self.helper(kind);
        helper.notify_with(event.clone());
        if let Some(&max) = self.limits.get(&kind) {
            let count = helper.call_count();
            if count > max {
                helper.notify_failed(format!("{kind} fired {count} times, at most {max} allowed"));
            }
        }
        self.extra.run(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::result::WaitError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    mod event_tests {
        use super::*;

        #[test]
        fn test_kind_matches_variant() {
            assert_eq!(ClientEvent::page_started("a").kind(), EventKind::PageStarted);
            assert_eq!(ClientEvent::title("t").kind(), EventKind::ReceivedTitle);
            assert_eq!(
                ClientEvent::RendererUnresponsive.kind(),
                EventKind::RendererUnresponsive
            );
            assert_eq!(
                ClientEvent::find_result(0, 2, true).kind(),
                EventKind::FindResult
            );
        }

        #[test]
        fn test_labels_unique() {
            let mut labels: Vec<_> = EventKind::ALL.iter().map(EventKind::as_str).collect();
            labels.sort_unstable();
            labels.dedup();
            assert_eq!(labels.len(), EventKind::ALL.len());
        }

        #[test]
        fn test_display() {
            assert_eq!(EventKind::LoginRequest.to_string(), "onReceivedLoginRequest");
        }

        #[test]
        fn test_event_serializes() {
            let json = serde_json::to_string(&ClientEvent::received_error(
                "http://x/",
                -2,
                "net::ERR_NAME_NOT_RESOLVED",
            ))
            .unwrap();
            assert!(json.contains("ReceivedError"));
            let back: ClientEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), EventKind::ReceivedError);
        }
    }

    mod dispatcher_tests {
        use super::*;

        #[test]
        fn test_unregistered_kind_is_noop() {
            let dispatcher = EventDispatcher::new();
            assert!(!dispatcher.handles(EventKind::PageFinished));
            assert_eq!(dispatcher.run(&ClientEvent::page_finished("a")), 0);
        }

        #[test]
        fn test_handlers_run_for_their_kind_only() {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);
            let dispatcher = EventDispatcher::new().on(EventKind::ReceivedIcon, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            dispatcher.dispatch(&ClientEvent::ReceivedIcon {
                width: 16,
                height: 16,
            });
            dispatcher.dispatch(&ClientEvent::title("x"));
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_handler_forwards_into_helper() {
            let responsive = PayloadHelper::<()>::named("responsive");
            let forward = responsive.clone();
            let dispatcher = EventDispatcher::new()
                .on(EventKind::RendererResponsive, move |_| forward.notify_called());
            dispatcher.dispatch(&ClientEvent::RendererResponsive);
            assert_eq!(responsive.call_count(), 1);
        }
    }

    mod recording_client_tests {
        use super::*;

        #[test]
        fn test_records_counts_and_payloads() {
            let client = RecordingClient::new();
            client.dispatch(&ClientEvent::console(ConsoleLevel::Log, "hello"));
            client.dispatch(&ClientEvent::console(ConsoleLevel::Error, "oops"));
            assert_eq!(client.call_count(EventKind::ConsoleMessage), 2);
            let messages = client.helper(EventKind::ConsoleMessage).history();
            assert_eq!(messages.len(), 2);
            assert_eq!(
                messages[1],
                ClientEvent::console(ConsoleLevel::Error, "oops")
            );
        }

        #[test]
        fn test_log_preserves_arrival_order() {
            let client = RecordingClient::new();
            client.dispatch(&ClientEvent::page_started("u"));
            client.dispatch(&ClientEvent::received_error("u", -6, "refused"));
            client.dispatch(&ClientEvent::page_finished("u"));
            let kinds: Vec<_> = client.events().iter().map(ClientEvent::kind).collect();
            assert_eq!(
                kinds,
                vec![
                    EventKind::PageStarted,
                    EventKind::ReceivedError,
                    EventKind::PageFinished
                ]
            );
            assert!(client.events_json().unwrap().contains("refused"));
        }

        #[test]
        fn test_snapshot_delta() {
            let client = RecordingClient::new();
            client.dispatch(&ClientEvent::title("a"));
            let before = client.snapshot();
            client.dispatch(&ClientEvent::title("b"));
            client.dispatch(&ClientEvent::title("c"));
            let after = client.snapshot();
            assert_eq!(before.get(EventKind::ReceivedTitle), 1);
            assert_eq!(after.delta(&before, EventKind::ReceivedTitle), 2);
            assert_eq!(after.delta(&before, EventKind::PageFinished), 0);
        }

        #[test]
        fn test_expect_at_most_fails_waiters() {
            let client = RecordingClient::with_options(WaitOptions::new().with_timeout(1_000))
                .expect_at_most(EventKind::VisualStateFlushed, 1);
            let before = client.snapshot();
            client.dispatch(&ClientEvent::VisualStateFlushed { request_id: 1 });
            client.dispatch(&ClientEvent::VisualStateFlushed { request_id: 1 });
            let err = client
                .wait_for(EventKind::VisualStateFlushed, &before, 1)
                .unwrap_err();
            assert!(matches!(err, WaitError::Failed { .. }));
            assert!(err.to_string().contains("at most 1"));
        }

        #[test]
        fn test_extra_handler_runs_after_recording() {
            let seen = Arc::new(AtomicUsize::new(0));
            let probe = Arc::clone(&seen);
            let client = RecordingClient::new().on(EventKind::DownloadStart, move |event| {
                if let ClientEvent::DownloadStart { content_length, .. } = event {
                    probe.store(*content_length as usize, Ordering::SeqCst);
                }
            });
            client.dispatch(&ClientEvent::DownloadStart {
                url: "http://x/download.txt".into(),
                user_agent: "ua".into(),
                content_disposition: "attachment;filename=\"download.txt\"".into(),
                mime_type: "text/plain".into(),
                content_length: 13,
            });
            assert_eq!(seen.load(Ordering::SeqCst), 13);
            assert_eq!(client.call_count(EventKind::DownloadStart), 1);
        }

        #[test]
        fn test_wait_for_cross_thread() {
            let client = Arc::new(RecordingClient::new());
            let before = client.snapshot();
            let engine: Arc<dyn EventSink> = client.clone();
            let handle = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                engine.dispatch(&ClientEvent::LoginRequest {
                    realm: "com.google".into(),
                    account: None,
                    args: "continue=x".into(),
                });
            });
            client.wait_for(EventKind::LoginRequest, &before, 1).unwrap();
            let payload = client
                .helper(EventKind::LoginRequest)
                .payload_after(before.get(EventKind::LoginRequest))
                .unwrap();
            assert!(matches!(payload, ClientEvent::LoginRequest { account: None, .. }));
            handle.join().unwrap();
        }
    }
}
