// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connect retry policy and bookkeeping.

use std::time::Duration;

/// Bounded retry policy for connect attempts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use detectordag_edge::supervisor::RetryPolicy;
///
/// // Default policy: 5 attempts, exponential backoff from 1s capped at 30s
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
///
/// // Fixed delay between attempts
/// let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per additional failure.
    pub backoff_multiplier: f32,
}

impl RetryPolicy {
    /// Same as [`RetryPolicy::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy waiting the same `delay` after every failure.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Overrides how many connect attempts may fail before escalation.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Overrides the wait after the first failed attempt.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Caps every wait at `delay`.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Overrides the factor each further failure scales the wait by.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Wait before the next connect, given `attempt` earlier retries.
    ///
    /// Grows as `initial_delay * backoff_multiplier^attempt` in whole
    /// milliseconds and never exceeds `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let growth = f64::from(self.backoff_multiplier).powi(exponent);
        let base_ms = u64::try_from(self.initial_delay.as_millis()).unwrap_or(u64::MAX);

        // `as` saturates at u64::MAX and sends NaN or negatives to zero
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let scaled_ms = (base_ms as f64 * growth) as u64;

        Duration::from_millis(scaled_ms).min(self.max_delay)
    }

    /// Returns true if another attempt is allowed after `failures`
    /// consecutive failures.
    #[must_use]
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Progress through the current run of failed connect attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive failed attempts since the last successful connect.
    pub attempt: u32,
    /// Delay before the next attempt.
    pub next_delay: Duration,
}

impl RetryState {
    /// Records a failed attempt and computes the next delay.
    pub fn record_failure(&mut self, policy: &RetryPolicy) {
        self.attempt = self.attempt.saturating_add(1);
        self.next_delay = policy.delay_for_attempt(self.attempt - 1);
    }

    /// Clears the state after a successful connect.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
