//! Test logging.
//!
//! Helpers, pollers and fixtures emit `tracing` events. Nothing is printed
//! until a subscriber is installed; tests that want the output call
//! [`init_test_logging`] first.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "eventwait=info";

/// Install a fmt subscriber writing through the test harness.
///
/// Honours `RUST_LOG`. Safe to call from every test: only the first call
/// installs anything, and it returns `true` only for that call.
pub fn init_test_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
