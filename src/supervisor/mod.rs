// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection lifecycle, bounded retry and reboot escalation.
//!
//! [`ConnectionSupervisor`] owns the cloud client. It retries a failing
//! connect in-process according to a [`RetryPolicy`]; once the ceiling is
//! reached it moves to [`ConnectionStatus::Failed`], asks the
//! [`RebootHandler`] to restart the host and reports an
//! [`UnrecoverableConnectionError`]. A failed supervisor never tries again.

mod policy;
mod reboot;

use std::fmt;
use std::time::Duration;

pub use policy::{RetryPolicy, RetryState};
#[cfg(feature = "balena")]
pub use reboot::{BalenaSupervisor, SUPERVISOR_ADDRESS_VAR, SUPERVISOR_API_KEY_VAR};
pub use reboot::{CommandReboot, RebootHandler};

use crate::cloud::CloudShadowClient;
use crate::error::{Error, UnrecoverableConnectionError};

/// Connection state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No session; the next publish connects.
    #[default]
    Disconnected,
    /// A connect attempt or its backoff is in progress.
    Connecting,
    /// A session is established.
    Connected,
    /// Retries are exhausted and a reboot was requested.
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Owns the cloud connection and decides when to give up on it.
pub struct ConnectionSupervisor<C, R> {
    client: C,
    reboot: R,
    policy: RetryPolicy,
    status: ConnectionStatus,
    retry: RetryState,
    failure: Option<UnrecoverableConnectionError>,
}

impl<C, R> ConnectionSupervisor<C, R>
where
    C: CloudShadowClient,
    R: RebootHandler,
{
    /// Creates a supervisor in the `Disconnected` state.
    pub fn new(client: C, reboot: R, policy: RetryPolicy) -> Self {
        Self {
            client,
            reboot,
            policy,
            status: ConnectionStatus::Disconnected,
            retry: RetryState::default(),
            failure: None,
        }
    }

    /// Returns the supervised client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Returns the retry bookkeeping of the current failure run.
    pub fn retry_state(&self) -> RetryState {
        self.retry
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Ensures a live connection, retrying with backoff.
    ///
    /// Returns immediately if already connected.
    ///
    /// # Errors
    ///
    /// Returns `UnrecoverableConnectionError` once the attempt ceiling is
    /// reached, after the reboot has been requested, and on every call after
    /// that.
    pub async fn connect(&mut self) -> Result<&C, UnrecoverableConnectionError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.status == ConnectionStatus::Connected && self.client.is_connected() {
            return Ok(&self.client);
        }

        loop {
            self.status = ConnectionStatus::Connecting;

            let error = match self.client.connect().await {
                Ok(()) => {
                    if self.retry.attempt > 0 {
                        tracing::info!(attempts = self.retry.attempt + 1, "Connection restored");
                    }
                    self.retry.reset();
                    self.status = ConnectionStatus::Connected;
                    return Ok(&self.client);
                }
                Err(e) => e,
            };

            self.retry.record_failure(&self.policy);
            let attempt = self.retry.attempt;

            if !self.policy.should_retry(attempt) {
                return Err(self.escalate(attempt, &error).await);
            }

            tracing::warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                next_delay = ?self.retry.next_delay,
                error = %error,
                "Connect attempt failed"
            );
            tokio::time::sleep(self.retry.next_delay).await;
        }
    }

    async fn escalate(
        &mut self,
        attempts: u32,
        error: &crate::error::ConnectError,
    ) -> UnrecoverableConnectionError {
        self.status = ConnectionStatus::Failed;
        let failure = UnrecoverableConnectionError {
            attempts,
            last_error: error.to_string(),
        };
        self.failure = Some(failure.clone());

        tracing::error!(
            attempts,
            error = %error,
            "Connection retries exhausted, requesting reboot"
        );
        self.reboot.request_reboot().await;

        failure
    }

    /// Publishes an encoded shadow update over a supervised connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unrecoverable` if no connection could be established
    /// and `Error::Publish` if the update was not confirmed.
    pub async fn publish(&mut self, payload: &[u8], timeout: Duration) -> Result<(), Error> {
        let client = self.connect().await?;
        let result = client.publish_shadow_update(payload, timeout).await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                if !self.client.is_connected() {
                    tracing::debug!("Connection lost during publish");
                    self.status = ConnectionStatus::Disconnected;
                }
                Err(e.into())
            }
        }
    }

    /// Closes the connection.
    ///
    /// Does nothing when already disconnected. A failed supervisor stays
    /// failed.
    pub async fn disconnect(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }

        self.client.disconnect().await;
        if self.status != ConnectionStatus::Failed {
            self.status = ConnectionStatus::Disconnected;
        }
    }
}

impl<C, R> fmt::Debug for ConnectionSupervisor<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("status", &self.status)
            .field("retry", &self.retry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
