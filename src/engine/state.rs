// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration, triggers and observable state.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::supervisor::ConnectionStatus;
use crate::types::PowerState;

/// Reconciliation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Period of the freshness check.
    pub poll_period: Duration,
    /// Time allowed for a publish to be confirmed.
    pub operation_timeout: Duration,
    /// When set, a periodic check republishes an unchanged state once the
    /// last successful publish is older than this.
    pub republish_after: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(3600),
            operation_timeout: Duration::from_secs(5),
            republish_after: None,
        }
    }
}

/// What caused a reconciliation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The engine entered service.
    Startup,
    /// The sensor reported a transition.
    SensorEdge,
    /// The freshness check period elapsed.
    Tick,
    /// The cloud asked for a fresh report.
    StatusRequest,
}

impl Trigger {
    /// Returns true if this trigger publishes regardless of the last
    /// published state.
    #[must_use]
    pub const fn is_forced(self) -> bool {
        matches!(self, Self::Startup | Self::StatusRequest)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "startup",
            Self::SensorEdge => "sensor-edge",
            Self::Tick => "tick",
            Self::StatusRequest => "status-request",
        };
        f.write_str(name)
    }
}

/// Result of one reconciliation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The state was published and confirmed.
    Published(PowerState),
    /// The shadow already reflects this state; nothing was sent.
    Unchanged(PowerState),
    /// The sensor could not be read; the check was skipped.
    SensorFailed,
    /// Publishing this state failed; a later check will retry.
    PublishFailed(PowerState),
}

impl CheckOutcome {
    /// Returns true if a publish was confirmed.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// Snapshot of the engine's view of the world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineState {
    /// Most recent state confirmed by the cloud; `None` before the first
    /// successful publish.
    pub last_published: Option<PowerState>,
    /// When `last_published` was confirmed.
    pub last_published_at: Option<DateTime<Utc>>,
    /// Number of confirmed publishes since startup.
    pub publish_count: u64,
    /// Connection status after the last check.
    pub connection: ConnectionStatus,
}
