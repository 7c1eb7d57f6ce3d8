//! Retry policy for host resolution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy applied while waiting for a target's hosts to appear.
///
/// The resolution gives up when either `max_attempts` or `max_elapsed` is
/// reached, whichever comes first. At least one of them should be set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    #[serde(with = "crate::config::duration_ms", rename = "initial_backoff_ms")]
    pub initial_backoff: Duration,
    /// Growth factor applied to the delay after every attempt
    pub multiplier: f64,
    /// Upper bound of a single delay
    #[serde(with = "crate::config::duration_ms", rename = "max_backoff_ms")]
    pub max_backoff: Duration,
    /// Maximum number of queries, unlimited if unset
    pub max_attempts: Option<u32>,
    /// Overall deadline of a resolution, unlimited if unset
    #[serde(with = "crate::config::opt_duration_ms", rename = "max_elapsed_ms")]
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(2),
            max_attempts: None,
            max_elapsed: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for the given retry count (0-based)
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64();
        let exponential = self.multiplier.powi(retry_count.min(i32::MAX as u32) as i32);
        let backoff = (base * exponential).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(backoff.max(0.0))
    }

    /// Delay to wait after `attempts` failed queries, `None` once the budget is spent.
    ///
    /// A delay that would reach the deadline ends the resolution instead, so
    /// every query starts with time left to answer.
    pub fn next_delay(&self, attempts: u32, elapsed: Duration) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempts >= max_attempts {
                return None;
            }
        }

        let delay = self.backoff_duration(attempts.saturating_sub(1));
        match self.remaining(elapsed) {
            Some(remaining) if delay >= remaining => None,
            _ => Some(delay),
        }
    }

    /// Time left before the overall deadline
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.max_elapsed
            .map(|max_elapsed| max_elapsed.saturating_sub(elapsed))
    }
}
