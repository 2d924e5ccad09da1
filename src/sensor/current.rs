// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Supply current read from a Linux hwmon channel.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::PowerSensor;
use crate::error::SensorError;
use crate::types::PowerState;

/// A poll-only power sensor backed by a current monitor such as an INA219.
///
/// The hwmon `curr*_input` file reports milliamps. Power is present while
/// the reading is strictly above the threshold, which defaults to zero.
#[derive(Debug, Clone)]
pub struct CurrentThresholdSensor {
    path: PathBuf,
    threshold_ma: f64,
}

impl CurrentThresholdSensor {
    /// Creates a sensor reading milliamps from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threshold_ma: 0.0,
        }
    }

    /// Sets the current, in milliamps, that must be exceeded for power to
    /// count as present.
    #[must_use]
    pub fn threshold_ma(mut self, threshold_ma: f64) -> Self {
        self.threshold_ma = threshold_ma;
        self
    }

    /// Returns the file the sensor reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the raw current in milliamps.
    ///
    /// # Errors
    ///
    /// Returns `SensorError::Unavailable` if the channel does not exist,
    /// `SensorError::Io` for other read failures and
    /// `SensorError::InvalidReading` if the file does not hold a number.
    pub fn read_ma(&self) -> Result<f64, SensorError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SensorError::Unavailable(format!(
                "no current channel at {}",
                self.path.display()
            )),
            _ => SensorError::Io {
                path: self.path.clone(),
                source,
            },
        })?;

        let value = raw.trim();
        match value.parse::<f64>() {
            Ok(ma) if ma.is_finite() => Ok(ma),
            _ => Err(SensorError::InvalidReading(value.to_string())),
        }
    }
}

impl PowerSensor for CurrentThresholdSensor {
    fn read(&self) -> Result<PowerState, SensorError> {
        let ma = self.read_ma()?;
        tracing::trace!(current_ma = ma, threshold_ma = self.threshold_ma, "Read supply current");
        Ok(PowerState::from(ma > self.threshold_ma))
    }
}
