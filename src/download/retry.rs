//! In-run retry policy for network-level failures.
//!
//! A file gets a fixed number of attempts per run. Between attempts the
//! worker sleeps `base + random(0, jitter)` so workers that failed together
//! against the same host do not retry in lockstep.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use export_files_core::download::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert!(policy.has_attempts_left(2));
//! assert!(!policy.has_attempts_left(3));
//!
//! let delay = policy.backoff_delay();
//! assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(2));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::config::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_JITTER, DEFAULT_MAX_ATTEMPTS};

/// Attempt budget and backoff between attempts.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_jitter`: 1 second
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Fixed part of every delay.
    base_delay: Duration,

    /// Upper bound of the random part of every delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow attempt number `attempt` (1-indexed).
    #[must_use]
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the next attempt: the base plus uniform jitter.
    #[must_use]
    pub fn backoff_delay(&self) -> Duration {
        self.base_delay + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}
