// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT topics of the classic AWS IoT device shadow.

/// The set of topics a device uses to talk to its shadow.
///
/// Uses the AWS IoT classic shadow structure:
/// - Update: `$aws/things/<thing>/shadow/update`
/// - Confirmations: `$aws/things/<thing>/shadow/update/accepted|rejected`
///
/// plus an application topic on which the cloud side asks for a fresh report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    update: String,
    accepted: String,
    rejected: String,
    status_request: String,
}

impl ShadowTopics {
    /// Builds the topic set for a thing, with the default status-request topic.
    #[must_use]
    pub fn for_thing(thing_name: &str) -> Self {
        Self::with_status_request(thing_name, Self::default_status_request(thing_name))
    }

    /// Builds the topic set for a thing with a custom status-request topic.
    #[must_use]
    pub fn with_status_request(thing_name: &str, status_request: impl Into<String>) -> Self {
        let update = format!("$aws/things/{thing_name}/shadow/update");
        Self {
            accepted: format!("{update}/accepted"),
            rejected: format!("{update}/rejected"),
            update,
            status_request: status_request.into(),
        }
    }

    /// Returns the default status-request topic for a thing.
    #[must_use]
    pub fn default_status_request(thing_name: &str) -> String {
        format!("detectordag/{thing_name}/status/request")
    }

    /// Topic shadow updates are published to.
    #[must_use]
    pub fn update(&self) -> &str {
        &self.update
    }

    /// Topic on which accepted updates are confirmed.
    #[must_use]
    pub fn accepted(&self) -> &str {
        &self.accepted
    }

    /// Topic on which rejected updates are reported.
    #[must_use]
    pub fn rejected(&self) -> &str {
        &self.rejected
    }

    /// Topic carrying status requests from the cloud side.
    #[must_use]
    pub fn status_request(&self) -> &str {
        &self.status_request
    }
}
