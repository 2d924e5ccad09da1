// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO input read through the Linux sysfs interface.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::PowerSensor;
use crate::error::SensorError;
use crate::types::PowerState;

/// Default sysfs GPIO root.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// A poll-only power sensor wired to a GPIO input pin.
///
/// The pin's `value` file is read on every check: `1` is high, `0` is low.
/// With `active_low` set, a low line means power is present.
#[derive(Debug, Clone)]
pub struct GpioSysfsSensor {
    root: PathBuf,
    pin: u32,
    active_low: bool,
}

impl GpioSysfsSensor {
    /// Creates a sensor for `pin` under the default sysfs root.
    #[must_use]
    pub fn new(pin: u32) -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT, pin)
    }

    /// Creates a sensor for `pin` under a custom sysfs root.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>, pin: u32) -> Self {
        Self {
            root: root.into(),
            pin,
            active_low: false,
        }
    }

    /// Inverts the mapping from line level to power state.
    #[must_use]
    pub fn active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    /// Returns the GPIO pin number.
    #[must_use]
    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn value_path(&self) -> PathBuf {
        self.pin_dir().join("value")
    }

    /// Exports the pin and configures it as an input if it is not yet
    /// visible under the sysfs root.
    ///
    /// # Errors
    ///
    /// Returns `SensorError::Io` if the export or direction file cannot be
    /// written.
    pub fn export(&self) -> Result<(), SensorError> {
        if self.value_path().exists() {
            return Ok(());
        }

        let export = self.root.join("export");
        write_file(&export, &self.pin.to_string())?;

        let direction = self.pin_dir().join("direction");
        write_file(&direction, "in")?;

        tracing::info!(pin = self.pin, "Exported GPIO pin as input");
        Ok(())
    }

    fn level_to_state(&self, high: bool) -> PowerState {
        PowerState::from(high != self.active_low)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), SensorError> {
    fs::write(path, contents).map_err(|source| SensorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl PowerSensor for GpioSysfsSensor {
    fn read(&self) -> Result<PowerState, SensorError> {
        let path = self.value_path();
        let raw = fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SensorError::Unavailable(format!(
                "GPIO {} is not exported ({})",
                self.pin,
                path.display()
            )),
            _ => SensorError::Io {
                path: path.clone(),
                source,
            },
        })?;

        match raw.trim() {
            "1" => Ok(self.level_to_state(true)),
            "0" => Ok(self.level_to_state(false)),
            other => Err(SensorError::InvalidReading(other.to_string())),
        }
    }
}
