// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory power sensor.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::{ChangeCallback, PowerSensor};
use crate::error::SensorError;
use crate::types::PowerState;

/// A sensor whose state is driven by code.
///
/// Behaves like an edge-triggered input: every change made through
/// [`set`](Self::set), [`high`](Self::high), [`low`](Self::low) or
/// [`toggle`](Self::toggle) is pushed to the registered callbacks.
///
/// # Examples
///
/// ```
/// use detectordag_edge::sensor::{MockPowerSensor, PowerSensor};
/// use detectordag_edge::types::PowerState;
///
/// let sensor = MockPowerSensor::new(PowerState::Off);
/// sensor.high();
/// assert_eq!(sensor.read().unwrap(), PowerState::On);
///
/// sensor.fail_next_reads(1);
/// assert!(sensor.read().is_err());
/// assert!(sensor.read().is_ok());
/// ```
pub struct MockPowerSensor {
    state: Mutex<PowerState>,
    callbacks: RwLock<Vec<ChangeCallback>>,
    failing_reads: AtomicU32,
    reads: AtomicU64,
}

impl MockPowerSensor {
    /// Creates a sensor with the given initial reading.
    #[must_use]
    pub fn new(initial: PowerState) -> Self {
        Self {
            state: Mutex::new(initial),
            callbacks: RwLock::new(Vec::new()),
            failing_reads: AtomicU32::new(0),
            reads: AtomicU64::new(0),
        }
    }

    /// Sets the reading, notifying callbacks if it changed.
    pub fn set(&self, state: PowerState) {
        let changed = {
            let mut current = self.state.lock();
            let changed = *current != state;
            *current = state;
            changed
        };

        if changed {
            tracing::debug!(%state, "Mock sensor changed");
            let callbacks = self.callbacks.read().clone();
            for callback in callbacks {
                callback(state);
            }
        }
    }

    /// Simulates power being present.
    pub fn high(&self) {
        self.set(PowerState::On);
    }

    /// Simulates power being absent.
    pub fn low(&self) {
        self.set(PowerState::Off);
    }

    /// Flips the reading and returns the new state.
    pub fn toggle(&self) -> PowerState {
        let next = self.state.lock().toggled();
        self.set(next);
        next
    }

    /// Makes the next `count` reads fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Returns the number of read attempts so far.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockPowerSensor {
    fn default() -> Self {
        Self::new(PowerState::Off)
    }
}

impl std::fmt::Debug for MockPowerSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPowerSensor")
            .field("state", &*self.state.lock())
            .field("callbacks", &self.callbacks.read().len())
            .finish_non_exhaustive()
    }
}

impl PowerSensor for MockPowerSensor {
    fn read(&self) -> Result<PowerState, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(SensorError::Unavailable("simulated read failure".into()));
        }

        Ok(*self.state.lock())
    }

    fn on_change(&self, callback: ChangeCallback) -> bool {
        self.callbacks.write().push(callback);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn callbacks_fire_only_on_change() {
        let sensor = MockPowerSensor::new(PowerState::Off);
        let edges = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&edges);
        assert!(sensor.on_change(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        sensor.low();
        assert_eq!(edges.load(Ordering::SeqCst), 0);

        sensor.high();
        sensor.high();
        assert_eq!(edges.load(Ordering::SeqCst), 1);

        assert_eq!(sensor.toggle(), PowerState::Off);
        assert_eq!(edges.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn callback_receives_new_state() {
        let sensor = MockPowerSensor::new(PowerState::Off);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sensor.on_change(Arc::new(move |state| sink.lock().push(state)));

        sensor.toggle();
        sensor.toggle();

        assert_eq!(*seen.lock(), vec![PowerState::On, PowerState::Off]);
    }

    #[test]
    fn simulated_failures_are_consumed() {
        let sensor = MockPowerSensor::new(PowerState::On);
        sensor.fail_next_reads(2);

        assert!(sensor.read().is_err());
        assert!(sensor.read().is_err());
        assert_eq!(sensor.read().unwrap(), PowerState::On);
        assert_eq!(sensor.read_count(), 3);
    }
}
