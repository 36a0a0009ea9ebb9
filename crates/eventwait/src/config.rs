//! Wait Configuration
//!
//! Timeouts and polling cadence shared by every helper created from the same
//! options. Timeouts can be scaled globally (slow emulators, sanitizer bots)
//! through `EVENTWAIT_TIMEOUT_SCALE` or a YAML file.

use crate::result::{WaitError, WaitResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for callback waits (5 seconds)
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 5_000;

/// Default timeout for polled criteria (3 seconds)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 3_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Environment variable holding the timeout multiplier
pub const TIMEOUT_SCALE_ENV: &str = "EVENTWAIT_TIMEOUT_SCALE";

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for callback waits and polling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Timeout for callback waits in milliseconds (before scaling)
    pub timeout_ms: u64,
    /// Timeout for polled criteria in milliseconds (before scaling)
    pub poll_timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Multiplier applied to both timeouts
    pub timeout_scale: f64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CALLBACK_TIMEOUT_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_scale: 1.0,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set callback timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling timeout in milliseconds
    #[must_use]
    pub const fn with_poll_timeout(mut self, poll_timeout_ms: u64) -> Self {
        self.poll_timeout_ms = poll_timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set the timeout multiplier
    #[must_use]
    pub const fn with_timeout_scale(mut self, scale: f64) -> Self {
        self.timeout_scale = scale;
        self
    }

    /// Scaled callback timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        scale(self.timeout_ms, self.timeout_scale)
    }

    /// Scaled polling timeout
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        scale(self.poll_timeout_ms, self.timeout_scale)
    }

    /// Polling interval (never scaled)
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check that the options are usable
    pub fn validate(&self) -> WaitResult<()> {
        if !self.timeout_scale.is_finite() || self.timeout_scale <= 0.0 {
            return Err(WaitError::Config {
                message: format!("timeout_scale must be positive, got {}", self.timeout_scale),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(WaitError::Config {
                message: "poll_interval_ms must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Defaults, with the timeout scale taken from `EVENTWAIT_TIMEOUT_SCALE`
    pub fn from_env() -> WaitResult<Self> {
        Self::default().with_env_scale(std::env::var(TIMEOUT_SCALE_ENV).ok().as_deref())
    }

    /// Apply a raw scale value as read from the environment
    pub fn with_env_scale(self, raw: Option<&str>) -> WaitResult<Self> {
        let Some(raw) = raw else {
            return Ok(self);
        };
        let scale = raw.trim().parse::<f64>().map_err(|e| WaitError::Config {
            message: format!("{TIMEOUT_SCALE_ENV}={raw:?}: {e}"),
        })?;
        let options = self.with_timeout_scale(scale);
        options.validate()?;
        Ok(options)
    }

    /// Parse options from YAML; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> WaitResult<Self> {
        let options: Self = serde_yaml_ng::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> WaitResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

/// Scale `ms` by `factor`, saturating instead of failing on values no
/// `Duration` can hold. Negative and NaN results clamp to zero.
fn scale(ms: u64, factor: f64) -> Duration {
    let secs = ms as f64 * factor / 1000.0;
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

// =============================================================================
// DEADLINES
// =============================================================================

/// Deadline `timeout` from now; `None` when no `Instant` can represent it
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Time left before `deadline`; unbounded when there is none
pub(crate) fn remaining_until(deadline: Option<Instant>) -> Duration {
    deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()))
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::io::Write;

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_wait_options_default() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_CALLBACK_TIMEOUT_MS);
            assert_eq!(opts.poll_timeout_ms, DEFAULT_POLL_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
            assert_eq!(opts.timeout_scale, 1.0);
        }

        #[test]
        fn test_wait_options_chained() {
            let opts = WaitOptions::new()
                .with_timeout(1_000)
                .with_poll_timeout(400)
                .with_poll_interval(20);
            assert_eq!(opts.timeout(), Duration::from_millis(1_000));
            assert_eq!(opts.poll_timeout(), Duration::from_millis(400));
            assert_eq!(opts.poll_interval(), Duration::from_millis(20));
        }

        #[test]
        fn test_scale_applies_to_timeouts_only() {
            let opts = WaitOptions::new()
                .with_timeout(1_000)
                .with_poll_timeout(100)
                .with_poll_interval(10)
                .with_timeout_scale(2.5);
            assert_eq!(opts.timeout(), Duration::from_millis(2_500));
            assert_eq!(opts.poll_timeout(), Duration::from_millis(250));
            assert_eq!(opts.poll_interval(), Duration::from_millis(10));
        }

        #[test]
        fn test_validate_rejects_bad_scale() {
            assert!(WaitOptions::new().with_timeout_scale(0.0).validate().is_err());
            assert!(WaitOptions::new().with_timeout_scale(-1.0).validate().is_err());
            assert!(WaitOptions::new()
                .with_timeout_scale(f64::NAN)
                .validate()
                .is_err());
        }

        #[test]
        fn test_validate_rejects_zero_interval() {
            let err = WaitOptions::new().with_poll_interval(0).validate();
            assert!(matches!(err, Err(WaitError::Config { .. })));
        }

        #[test]
        fn test_unvalidated_scale_clamps_instead_of_panicking() {
            let negative = WaitOptions::new().with_timeout_scale(-1.0);
            assert_eq!(negative.timeout(), Duration::ZERO);
            assert_eq!(negative.poll_timeout(), Duration::ZERO);
            let nan = WaitOptions::new().with_timeout_scale(f64::NAN);
            assert_eq!(nan.timeout(), Duration::ZERO);
            let huge = WaitOptions::new()
                .with_timeout(u64::MAX)
                .with_timeout_scale(f64::MAX);
            assert_eq!(huge.timeout(), Duration::MAX);
            let infinite = WaitOptions::new().with_timeout_scale(f64::INFINITY);
            assert_eq!(infinite.poll_timeout(), Duration::MAX);
        }
    }

    mod deadline_tests {
        use super::*;

        #[test]
        fn test_unreachable_deadline_is_none() {
            assert!(deadline_after(Duration::MAX).is_none());
            assert_eq!(remaining_until(None), Duration::MAX);
        }

        #[test]
        fn test_remaining_saturates_at_zero() {
            let past = deadline_after(Duration::ZERO);
            std::thread::sleep(Duration::from_millis(2));
            assert_eq!(remaining_until(past), Duration::ZERO);
        }

        #[test]
        fn test_millis_saturates() {
            assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
            assert_eq!(millis(Duration::MAX), u64::MAX);
        }
    }

    mod env_tests {
        use super::*;

        #[test]
        fn test_env_scale_absent_keeps_defaults() {
            let opts = WaitOptions::new().with_env_scale(None).unwrap();
            assert_eq!(opts, WaitOptions::default());
        }

        #[test]
        fn test_env_scale_parsed() {
            let opts = WaitOptions::new().with_env_scale(Some(" 3 ")).unwrap();
            assert_eq!(opts.timeout_scale, 3.0);
        }

        #[test]
        fn test_env_scale_garbage() {
            let err = WaitOptions::new().with_env_scale(Some("fast")).unwrap_err();
            assert!(err.to_string().contains(TIMEOUT_SCALE_ENV));
        }

        #[test]
        fn test_env_scale_negative() {
            assert!(WaitOptions::new().with_env_scale(Some("-2")).is_err());
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_yaml_partial_keeps_defaults() {
            let opts = WaitOptions::from_yaml_str("timeout_ms: 250\n").unwrap();
            assert_eq!(opts.timeout_ms, 250);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_yaml_invalid_scale() {
            let err = WaitOptions::from_yaml_str("timeout_scale: 0\n").unwrap_err();
            assert!(matches!(err, WaitError::Config { .. }));
        }

        #[test]
        fn test_yaml_malformed() {
            let err = WaitOptions::from_yaml_str("timeout_ms: [").unwrap_err();
            assert!(matches!(err, WaitError::Yaml(_)));
        }

        #[test]
        fn test_yaml_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "poll_interval_ms: 5\ntimeout_scale: 1.5").unwrap();
            let opts = WaitOptions::from_yaml_file(file.path()).unwrap();
            assert_eq!(opts.poll_interval_ms, 5);
            assert_eq!(opts.timeout_scale, 1.5);
        }

        #[test]
        fn test_yaml_file_missing() {
            let err = WaitOptions::from_yaml_file("/nonexistent/eventwait.yaml").unwrap_err();
            assert!(matches!(err, WaitError::Io(_)));
        }
    }
}
