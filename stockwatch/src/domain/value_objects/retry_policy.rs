//! Retry policy value object.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for webhook requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial delay between attempts in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    #[serde(default)]
    pub use_jitter: bool,
}

fn default_max_attempts() -> u32 {
    6
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retry policy with a custom attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a retry policy that never retries.
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    /// Calculate the backoff for a given growth step (0-indexed).
    ///
    /// The step only advances on computed backoffs; server-provided
    /// retry-after waits do not move it.
    pub fn delay_for_attempt(&self, step: u32) -> Duration {
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(step as i32);

        let delay_ms = base_delay.min(self.max_delay_ms as f64) as u64;

        if self.use_jitter {
            // Add up to 25% jitter
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            Duration::from_millis(delay_ms + jitter)
        } else {
            Duration::from_millis(delay_ms)
        }
    }

    /// Longest single wait, whether computed or server-directed.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Check if another attempt is allowed after `attempts_made`.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts.max(1)
    }

    /// Upper bound of time spent sleeping between attempts.
    ///
    /// Both computed backoffs and server-directed waits are held to
    /// `max_delay`; jitter may add a quarter on top.
    pub fn max_total_delay(&self) -> Duration {
        let waits = self.max_attempts.saturating_sub(1);
        let per_wait = if self.use_jitter {
            self.max_delay().mul_f64(1.25)
        } else {
            self.max_delay()
        };
        per_wait * waits
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            use_jitter: false,
        }
    }
}
