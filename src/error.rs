// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the edge agent.
//!
//! Every failure the agent can observe falls in one of two groups:
//!
//! - **Recoverable**: [`DecodeError`], [`SensorError`], [`ConnectError`] and
//!   [`PublishError`]. These are logged and absorbed by the component that
//!   sees them; the next reconciliation check retries naturally.
//! - **Fatal**: [`UnrecoverableConnectionError`] and [`ConfigError`]. The first
//!   is raised after the connection retry ceiling is exhausted and a reboot was
//!   requested, the second refuses startup on incomplete configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A shadow payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The power sensor could not be read.
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// A single connect attempt failed.
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// A shadow update was not confirmed.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// The connection could not be restored and a reboot was requested.
    #[error(transparent)]
    Unrecoverable(#[from] UnrecoverableConnectionError),

    /// The agent configuration is incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The periodic scheduler was misused.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl Error {
    /// Returns true if this error must end the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable(_) | Self::Config(_))
    }
}

/// Errors raised while decoding a shadow payload or a power status value.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is JSON but not a shadow envelope.
    #[error("malformed shadow envelope: {0}")]
    Malformed(String),

    /// The envelope has no `status` field.
    #[error("missing status field")]
    MissingStatus,

    /// The `status` field holds a value that maps to neither on nor off.
    #[error("unrecognized power status: {0}")]
    InvalidStatus(String),
}

/// Errors raised by a power sensor read.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Reading the sensor's backing file failed.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sensor produced a value that is neither high nor low.
    #[error("invalid sensor reading: {0}")]
    InvalidReading(String),

    /// The sensor is temporarily unable to produce a reading.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a single transport connect attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The MQTT client rejected a request.
    #[cfg(feature = "aws-iot")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The broker could not be reached or refused the connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No CONNACK was received in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// TLS material could not be used.
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Errors raised while publishing a shadow update.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The MQTT client rejected the publish request.
    #[cfg(feature = "aws-iot")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// No confirmation arrived before the operation timeout.
    #[error("shadow update not confirmed after {0:?}")]
    Timeout(Duration),

    /// The shadow service rejected the update.
    #[error("shadow update rejected ({code}): {message}")]
    Rejected {
        /// Rejection code reported by the shadow service.
        code: u16,
        /// Human readable rejection reason.
        message: String,
    },

    /// There is no live connection to publish on.
    #[error("not connected")]
    NotConnected,

    /// The update document could not be tagged for confirmation matching.
    #[error("invalid shadow update document: {0}")]
    InvalidPayload(String),
}

/// Raised once the connect retry ceiling is exhausted.
///
/// A reboot has already been requested when this error is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("connection unrecoverable after {attempts} attempts: {last_error}")]
pub struct UnrecoverableConnectionError {
    /// Number of consecutive failed connect attempts.
    pub attempts: u32,
    /// Description of the last connect failure.
    pub last_error: String,
}

/// Errors related to agent configuration and certificate material.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value was not provided.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A value was provided but is not acceptable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending configuration field.
        field: &'static str,
        /// Why the value was refused.
        reason: String,
    },

    /// A certificate file does not exist.
    #[error("certificate missing: {}", .0.display())]
    CertificateMissing(PathBuf),

    /// Base64 certificate material could not be decoded.
    #[error("failed to decode {var}: {source}")]
    Base64 {
        /// The environment variable holding the material.
        var: &'static str,
        /// The decoding failure.
        #[source]
        source: base64::DecodeError,
    },

    /// A certificate file could not be read or written.
    #[error("certificate I/O on {}: {source}", .path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to the periodic scheduler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start` was called while a schedule is already active.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// The requested period is zero.
    #[error("scheduler period must be greater than zero")]
    ZeroPeriod,
}

/// Errors raised while asking the host to reboot.
#[derive(Debug, Error)]
pub enum RebootError {
    /// The supervisor HTTP request failed.
    #[cfg(feature = "balena")]
    #[error("supervisor request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The supervisor answered with a non-success status.
    #[error("supervisor refused reboot with status {0}")]
    Refused(u16),

    /// The reboot command could not be spawned or failed.
    #[error("reboot command failed: {0}")]
    Command(#[from] std::io::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
