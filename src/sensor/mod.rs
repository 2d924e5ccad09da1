// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power presence sensors.
//!
//! A [`PowerSensor`] always supports on-demand reads. Edge-triggered sources
//! additionally accept a change callback through
//! [`on_change`](PowerSensor::on_change); poll-only sources keep the default
//! implementation and rely on the periodic check.
//!
//! # Implementations
//!
//! - [`GpioSysfsSensor`]: poll-only GPIO input read through sysfs
//! - [`CurrentThresholdSensor`]: poll-only current monitor compared against
//!   a threshold
//! - [`MockPowerSensor`]: in-memory sensor for tests and the `mock` mode

mod current;
mod gpio;
mod mock;

use std::sync::Arc;

pub use current::CurrentThresholdSensor;
pub use gpio::GpioSysfsSensor;
pub use mock::MockPowerSensor;

use crate::error::SensorError;
use crate::types::PowerState;

/// Callback invoked with the new reading on every sensor edge.
pub type ChangeCallback = Arc<dyn Fn(PowerState) + Send + Sync>;

/// A source of truth for mains power presence.
pub trait PowerSensor: Send + Sync {
    /// Reads the current power state.
    ///
    /// Reads are expected to be fast and non-blocking.
    ///
    /// # Errors
    ///
    /// Returns `SensorError` if the hardware could not be read.
    fn read(&self) -> Result<PowerState, SensorError>;

    /// Registers a callback for edge events.
    ///
    /// Returns false if this sensor cannot push changes, in which case the
    /// callback is dropped.
    fn on_change(&self, callback: ChangeCallback) -> bool {
        drop(callback);
        false
    }
}

impl<S: PowerSensor + ?Sized> PowerSensor for Arc<S> {
    fn read(&self) -> Result<PowerState, SensorError> {
        (**self).read()
    }

    fn on_change(&self, callback: ChangeCallback) -> bool {
        (**self).on_change(callback)
    }
}
