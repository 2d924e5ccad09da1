// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud-side device shadow transport.
//!
//! A [`CloudShadowClient`] knows how to open a session with the cloud, push a
//! shadow update and wait for its confirmation, and deliver status requests
//! coming back from the cloud. Retrying and giving up are not its concern:
//! the [`ConnectionSupervisor`](crate::supervisor::ConnectionSupervisor)
//! drives it.
//!
//! # Implementations
//!
//! - [`AwsIotShadowClient`]: AWS IoT classic shadow over MQTT/TLS (feature
//!   `aws-iot`)

#[cfg(feature = "aws-iot")]
mod aws;

use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "aws-iot")]
pub use aws::{AwsIotShadowClient, AwsIotShadowClientBuilder};

use crate::error::{ConnectError, PublishError};

/// Callback invoked when the cloud asks the device for a fresh report.
pub type StatusRequestCallback = Arc<dyn Fn() + Send + Sync>;

/// Transport to the cloud device shadow.
#[allow(async_fn_in_trait)]
pub trait CloudShadowClient: Send + Sync {
    /// Opens a session with the cloud.
    ///
    /// Any previous session is torn down first. Status request subscriptions
    /// are (re)established as part of a successful connect.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError` if this single attempt fails.
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Closes the session. Does nothing if there is none.
    async fn disconnect(&self);

    /// Publishes an encoded shadow update and waits for the cloud to accept
    /// it.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Timeout` if no confirmation arrives within
    /// `timeout`, `PublishError::Rejected` if the cloud refused the update,
    /// and `PublishError::NotConnected` if there is no live session.
    async fn publish_shadow_update(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), PublishError>;

    /// Registers the handler for status requests, replacing any previous one.
    fn subscribe_status_requests(&self, callback: StatusRequestCallback);

    /// Returns true while a session is believed to be live.
    fn is_connected(&self) -> bool;
}
