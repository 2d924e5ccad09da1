// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mains power presence.
//!
//! Sensors and historical shadow producers encode power presence in several
//! ways: booleans, `0`/`1` integers and the strings `"on"`/`"off"`. All of
//! them normalize to [`PowerState`] at the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Whether mains power is present.
///
/// There is no "unknown" inhabitant: a reading either produced a definite
/// state or it failed.
///
/// # Examples
///
/// ```
/// use detectordag_edge::types::PowerState;
///
/// assert_eq!(PowerState::from(true), PowerState::On);
/// assert_eq!(PowerState::try_from(0_i64).unwrap(), PowerState::Off);
/// assert_eq!("on".parse::<PowerState>().unwrap(), PowerState::On);
/// assert_eq!(PowerState::Off.as_str(), "off");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "&'static str")]
pub enum PowerState {
    /// Mains power is absent.
    Off,
    /// Mains power is present.
    On,
}

impl PowerState {
    /// Returns the wire representation used in shadow documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }

    /// Returns true if power is present.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }

    /// Returns the opposite state.
    #[must_use]
    pub const fn toggled(&self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("on") {
            Ok(Self::On)
        } else if s.eq_ignore_ascii_case("off") {
            Ok(Self::Off)
        } else {
            Err(DecodeError::InvalidStatus(s.to_string()))
        }
    }
}

impl From<bool> for PowerState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl From<PowerState> for bool {
    fn from(value: PowerState) -> Self {
        value.is_on()
    }
}

impl TryFrom<i64> for PowerState {
    type Error = DecodeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::On),
            other => Err(DecodeError::InvalidStatus(other.to_string())),
        }
    }
}

impl TryFrom<&Value> for PowerState {
    type Error = DecodeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(Self::from(*b)),
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| DecodeError::InvalidStatus(n.to_string()))
                .and_then(Self::try_from),
            Value::String(s) => s.parse(),
            other => Err(DecodeError::InvalidStatus(other.to_string())),
        }
    }
}

impl TryFrom<Value> for PowerState {
    type Error = DecodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::try_from(&value)
    }
}

impl From<PowerState> for &'static str {
    fn from(value: PowerState) -> Self {
        value.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heterogeneous_inputs_normalize_to_on() {
        let from_bool = PowerState::from(true);
        let from_int = PowerState::try_from(1_i64).unwrap();
        let from_str: PowerState = "on".parse().unwrap();

        assert_eq!(from_bool, PowerState::On);
        assert_eq!(from_int, from_bool);
        assert_eq!(from_str, from_bool);
    }

    #[test]
    fn heterogeneous_inputs_normalize_to_off() {
        let from_bool = PowerState::from(false);
        let from_int = PowerState::try_from(0_i64).unwrap();
        let from_str: PowerState = "off".parse().unwrap();

        assert_eq!(from_bool, PowerState::Off);
        assert_eq!(from_int, from_bool);
        assert_eq!(from_str, from_bool);
    }

    #[test]
    fn string_parsing_ignores_case() {
        assert_eq!("ON".parse::<PowerState>().unwrap(), PowerState::On);
        assert_eq!("Off".parse::<PowerState>().unwrap(), PowerState::Off);
    }

    #[test]
    fn unrecognized_inputs_are_rejected() {
        assert!(matches!(
            "maybe".parse::<PowerState>(),
            Err(DecodeError::InvalidStatus(_))
        ));
        assert!(matches!(
            PowerState::try_from(2_i64),
            Err(DecodeError::InvalidStatus(_))
        ));
        assert!(PowerState::try_from(&json!(null)).is_err());
        assert!(PowerState::try_from(&json!(0.5)).is_err());
        assert!(PowerState::try_from(&json!({"status": "on"})).is_err());
    }

    #[test]
    fn json_values_normalize() {
        assert_eq!(PowerState::try_from(&json!(true)).unwrap(), PowerState::On);
        assert_eq!(PowerState::try_from(&json!(0)).unwrap(), PowerState::Off);
        assert_eq!(PowerState::try_from(&json!("on")).unwrap(), PowerState::On);
    }

    #[test]
    fn serde_uses_wire_strings() {
        assert_eq!(serde_json::to_string(&PowerState::On).unwrap(), "\"on\"");
        let state: PowerState = serde_json::from_str("1").unwrap();
        assert_eq!(state, PowerState::On);
        let state: PowerState = serde_json::from_str("false").unwrap();
        assert_eq!(state, PowerState::Off);
    }

    #[test]
    fn toggled_flips_state() {
        assert_eq!(PowerState::On.toggled(), PowerState::Off);
        assert_eq!(PowerState::Off.toggled(), PowerState::On);
        assert!(bool::from(PowerState::On));
    }
}
