// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Encoding and decoding of shadow update payloads.

use serde_json::{Value, json};

use crate::error::DecodeError;
use crate::types::PowerState;

/// A reported-state update for the device shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowUpdate {
    reported: PowerState,
}

impl ShadowUpdate {
    /// Creates an update reporting the given power state.
    #[must_use]
    pub const fn reported(state: PowerState) -> Self {
        Self { reported: state }
    }

    /// Returns the reported power state.
    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.reported
    }

    /// Returns the canonical JSON document for this update.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "state": {
                "reported": {
                    "status": self.reported.as_str(),
                }
            }
        })
    }

    /// Reads an update from a JSON document.
    ///
    /// Both the full `{"state": {"reported": {...}}}` envelope and a bare
    /// `{"status": ...}` object are accepted.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the document is not an object, if the
    /// envelope is incomplete, or if the status is missing or unrecognized.
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::Malformed(format!("expected an object, got {value}")))?;

        let reported = match object.get("state") {
            Some(state) => state
                .get("reported")
                .filter(|reported| reported.is_object())
                .ok_or_else(|| {
                    DecodeError::Malformed("state.reported is missing or not an object".into())
                })?,
            None => value,
        };

        let status = reported.get("status").ok_or(DecodeError::MissingStatus)?;

        Ok(Self::reported(PowerState::try_from(status)?))
    }
}

impl From<PowerState> for ShadowUpdate {
    fn from(state: PowerState) -> Self {
        Self::reported(state)
    }
}

/// Maps [`PowerState`] values to and from shadow payload bytes.
///
/// # Examples
///
/// ```
/// use detectordag_edge::shadow::ShadowCodec;
/// use detectordag_edge::types::PowerState;
///
/// let bytes = ShadowCodec::encode(PowerState::On);
/// assert_eq!(bytes, br#"{"state":{"reported":{"status":"on"}}}"#);
/// assert_eq!(ShadowCodec::decode(&bytes).unwrap(), PowerState::On);
/// assert_eq!(ShadowCodec::decode(br#"{"status":1}"#).unwrap(), PowerState::On);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowCodec;

impl ShadowCodec {
    /// Encodes a power state as a shadow update payload.
    #[must_use]
    pub fn encode(state: PowerState) -> Vec<u8> {
        ShadowUpdate::reported(state).to_json().to_string().into_bytes()
    }

    /// Decodes a shadow update payload.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the payload is not JSON, is not a shadow
    /// envelope, or carries no recognizable status.
    pub fn decode(bytes: &[u8]) -> Result<PowerState, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        ShadowUpdate::from_json(&value).map(|update| update.state())
    }
}
