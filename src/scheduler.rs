// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Restartable repeating-callback primitive.
//!
//! [`PeriodicScheduler`] runs a callback once per period on a background
//! tokio task. The first invocation happens one full period after
//! [`start`](PeriodicScheduler::start); callers wanting an immediate run do it
//! themselves.
//!
//! # Stop semantics
//!
//! [`stop`](PeriodicScheduler::stop) is idempotent. Once it returns, no new
//! invocation begins. An invocation already running when `stop` is called is
//! allowed to finish (`stop` waits for it) rather than being preempted.
//!
//! # Failure semantics
//!
//! A callback returning `Err`, or panicking, is logged and the schedule
//! continues with the next period.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::SchedulerError;

/// A single-owner periodic callback runner.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use detectordag_edge::scheduler::PeriodicScheduler;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut scheduler = PeriodicScheduler::new();
/// scheduler
///     .start(Duration::from_secs(30), || -> Result<(), String> { Ok(()) })
///     .unwrap();
/// assert!(scheduler.is_running());
///
/// scheduler.stop();
/// scheduler.stop(); // idempotent
/// assert!(!scheduler.is_running());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PeriodicScheduler {
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    /// Cleared by `stop`; every invocation holds a read guard while running.
    gate: Arc<RwLock<bool>>,
    task: JoinHandle<()>,
    period: Duration,
}

impl PeriodicScheduler {
    /// Creates a scheduler with no active schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a schedule is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Returns the period of the active schedule.
    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.running.as_ref().map(|running| running.period)
    }

    /// Starts invoking `callback` once per `period`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if a schedule is active, and
    /// `SchedulerError::ZeroPeriod` if `period` is zero.
    pub fn start<F, E>(&mut self, period: Duration, mut callback: F) -> Result<(), SchedulerError>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        if self.running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }

        let gate = Arc::new(RwLock::new(true));
        let task_gate = Arc::clone(&gate);

        let task = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;

                let active = task_gate.read();
                if !*active {
                    break;
                }

                match panic::catch_unwind(AssertUnwindSafe(&mut callback)) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Periodic callback failed");
                    }
                    Err(_) => {
                        tracing::error!("Periodic callback panicked");
                    }
                }
                drop(active);
            }
        });

        tracing::debug!(?period, "Periodic scheduler started");
        self.running = Some(Running { gate, task, period });
        Ok(())
    }

    /// Cancels future invocations.
    ///
    /// Calling `stop` on a scheduler that was never started, or that is
    /// already stopped, does nothing.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        *running.gate.write() = false;
        running.task.abort();
        tracing::debug!(period = ?running.period, "Periodic scheduler stopped");
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
