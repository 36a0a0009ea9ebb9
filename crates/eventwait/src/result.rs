//! Result and error types for eventwait.

use thiserror::Error;

/// Result type for wait operations
pub type WaitResult<T> = Result<T, WaitError>;

/// Errors that can occur while waiting on asynchronous events
#[derive(Debug, Error)]
pub enum WaitError {
    /// The awaited callback did not reach its target count in time
    #[error(
        "Timed out after {timeout_ms}ms waiting for '{label}': \
         baseline {baseline}, target {target}, observed {observed}"
    )]
    Timeout {
        /// Helper label
        label: String,
        /// Count captured before the action
        baseline: usize,
        /// Count the wait needed to reach
        target: usize,
        /// Count at the deadline
        observed: usize,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// A polled predicate never became true
    #[error(
        "Polling '{description}' timed out after {timeout_ms}ms ({attempts} attempts){}",
        failure_suffix(.last_failure)
    )]
    PollTimeout {
        /// What was polled
        description: String,
        /// Number of predicate evaluations
        attempts: usize,
        /// Timeout in milliseconds
        timeout_ms: u64,
        /// Last failure message reported by the criteria
        last_failure: Option<String>,
    },

    /// A callback fired more (or fewer) times than the test allows
    #[error("Unexpected call count for '{label}': expected {expected}, got {actual}")]
    UnexpectedCall {
        /// Helper label
        label: String,
        /// Allowed count
        expected: usize,
        /// Observed count
        actual: usize,
    },

    /// The waiting thread was interrupted
    #[error("Wait for '{label}' was interrupted")]
    Interrupted {
        /// Helper label
        label: String,
    },

    /// The producer reported a failure instead of a normal call
    #[error("'{label}' failed: {reason}")]
    Failed {
        /// Helper label
        label: String,
        /// Failure reason from the producer
        reason: String,
    },

    /// A task posted to a worker thread panicked
    #[error("Task on thread '{thread}' panicked")]
    TaskPanicked {
        /// Thread name
        thread: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

fn failure_suffix(last_failure: &Option<String>) -> String {
    last_failure
        .as_ref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl WaitError {
    /// Whether this error is one of the timeout variants
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::PollTimeout { .. })
    }

    /// Whether this error came from an interrupted wait
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
