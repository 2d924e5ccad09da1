// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host reboot mechanisms.

use std::sync::Arc;
#[cfg(feature = "balena")]
use std::time::Duration;

#[cfg(feature = "balena")]
use reqwest::Client;

use crate::error::RebootError;

/// Mechanism used to restart the host once the connection is unrecoverable.
#[allow(async_fn_in_trait)]
pub trait RebootHandler: Send + Sync {
    /// Requests a reboot of the host.
    ///
    /// Fire-and-forget: failures are logged by the implementation, and the
    /// process may be terminated before this returns.
    async fn request_reboot(&self);
}

impl<R: RebootHandler> RebootHandler for Arc<R> {
    async fn request_reboot(&self) {
        (**self).request_reboot().await;
    }
}

// ============================================================================
// BalenaSupervisor - reboot through the balena supervisor API
// ============================================================================

/// Environment variable holding the supervisor base URL.
#[cfg(feature = "balena")]
pub const SUPERVISOR_ADDRESS_VAR: &str = "BALENA_SUPERVISOR_ADDRESS";
/// Environment variable holding the supervisor API key.
#[cfg(feature = "balena")]
pub const SUPERVISOR_API_KEY_VAR: &str = "BALENA_SUPERVISOR_API_KEY";

/// Reboots the device through the balena supervisor HTTP API.
///
/// Sends `POST {address}/v1/reboot?apikey={key}` with `{"force": true}`.
///
/// # Examples
///
/// ```no_run
/// use detectordag_edge::supervisor::BalenaSupervisor;
///
/// # fn main() -> Result<(), detectordag_edge::error::RebootError> {
/// let supervisor = BalenaSupervisor::new("http://127.0.0.1:48484", "secret")?;
/// assert_eq!(supervisor.reboot_url(), "http://127.0.0.1:48484/v1/reboot?apikey=secret");
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "balena")]
#[derive(Debug, Clone)]
pub struct BalenaSupervisor {
    client: Client,
    address: String,
    api_key: String,
}

#[cfg(feature = "balena")]
impl BalenaSupervisor {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a supervisor client for the given address and API key.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(address: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RebootError> {
        let client = Client::builder().timeout(Self::DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Creates a supervisor client from `BALENA_SUPERVISOR_ADDRESS` and
    /// `BALENA_SUPERVISOR_API_KEY`.
    ///
    /// Returns `Ok(None)` when either variable is unset, which means the
    /// agent is not running under balena.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn from_env() -> Result<Option<Self>, RebootError> {
        let address = std::env::var(SUPERVISOR_ADDRESS_VAR).ok();
        let api_key = std::env::var(SUPERVISOR_API_KEY_VAR).ok();

        match (address, api_key) {
            (Some(address), Some(api_key)) if !address.is_empty() => {
                Self::new(address, api_key).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Returns the full reboot URL, including the API key.
    #[must_use]
    pub fn reboot_url(&self) -> String {
        format!(
            "{}/v1/reboot?apikey={}",
            self.address,
            urlencoding::encode(&self.api_key)
        )
    }

    /// Asks the supervisor to reboot the device.
    ///
    /// # Errors
    ///
    /// Returns `RebootError::Http` if the request fails and
    /// `RebootError::Refused` if the supervisor answers with an error status.
    pub async fn reboot(&self) -> Result<(), RebootError> {
        tracing::debug!(address = %self.address, "Sending reboot request to supervisor");

        let response = self
            .client
            .post(self.reboot_url())
            .json(&serde_json::json!({ "force": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RebootError::Refused(response.status().as_u16()));
        }

        Ok(())
    }
}

#[cfg(feature = "balena")]
impl RebootHandler for BalenaSupervisor {
    async fn request_reboot(&self) {
        match self.reboot().await {
            Ok(()) => tracing::error!(address = %self.address, "Supervisor accepted reboot request"),
            Err(e) => tracing::error!(address = %self.address, error = %e, "Supervisor reboot request failed"),
        }
    }
}

// ============================================================================
// CommandReboot - reboot by running a host command
// ============================================================================

/// Reboots the host by running a command, `reboot` by default.
#[derive(Debug, Clone)]
pub struct CommandReboot {
    program: String,
    args: Vec<String>,
}

impl CommandReboot {
    /// Creates a handler running `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the program this handler runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the command and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns `RebootError::Command` if the command cannot be spawned or
    /// exits unsuccessfully.
    pub async fn run(&self) -> Result<(), RebootError> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(RebootError::Command(std::io::Error::other(format!(
                "{} exited with {status}",
                self.program
            ))))
        }
    }
}

impl Default for CommandReboot {
    fn default() -> Self {
        Self::new("reboot", std::iter::empty::<String>())
    }
}

impl RebootHandler for CommandReboot {
    async fn request_reboot(&self) {
        tracing::error!(program = %self.program, "Rebooting host");
        if let Err(e) = self.run().await {
            tracing::error!(program = %self.program, error = %e, "Reboot command failed");
        }
    }
}
