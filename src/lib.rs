// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `detectordag-edge` - mirrors a mains power-presence signal into a cloud
//! device shadow.
//!
//! The agent watches a binary power sensor and keeps the `status` property of
//! an AWS IoT device shadow in line with it. It runs unattended on small
//! hosts and survives transient network loss, sensor read failures and
//! restarts without losing state transitions.
//!
//! # Components
//!
//! - [`sensor`]: the [`PowerSensor`] capability (GPIO sysfs, mock)
//! - [`shadow`]: the [`ShadowCodec`] wire format and shadow topics
//! - [`cloud`]: the [`CloudShadowClient`] capability (AWS IoT over MQTT)
//! - [`supervisor`]: [`ConnectionSupervisor`] with bounded retry and reboot
//!   escalation
//! - [`scheduler`]: [`PeriodicScheduler`] for freshness checks
//! - [`engine`]: the [`ReconciliationEngine`] tying everything together
//! - [`config`]: [`AgentConfig`] and certificate provisioning
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use detectordag_edge::{
//!     AgentConfig, AwsIotShadowClient, CommandReboot, ConnectionSupervisor, GpioSysfsSensor,
//!     ReconciliationEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::new("92f59eeb298c4f8c8773e4704d9afe74", "example-ats.iot.eu-west-1.amazonaws.com")
//!         .with_certs_dir("/data/certs");
//!     config.validate()?;
//!
//!     let client = AwsIotShadowClient::builder()
//!         .endpoint(&config.endpoint)
//!         .port(config.port)
//!         .thing_name(&config.device_id)
//!         .topics(config.topics())
//!         .tls(config.certs.load()?)
//!         .build()?;
//!     let supervisor = ConnectionSupervisor::new(client, CommandReboot::default(), config.retry.clone());
//!
//!     let mut engine = ReconciliationEngine::new(
//!         GpioSysfsSensor::new(4),
//!         supervisor,
//!         config.engine_config(),
//!     );
//!     engine.start().await?;
//!     engine
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Failure handling
//!
//! Sensor and publish failures never stop the agent: the check is skipped and
//! the next one retries. The only fatal path is connection loss that the
//! retry policy cannot absorb, in which case a host reboot is requested and
//! [`Error::Unrecoverable`] is returned.

pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod sensor;
pub mod shadow;
pub mod supervisor;
pub mod types;

#[cfg(feature = "aws-iot")]
pub use cloud::AwsIotShadowClient;
pub use cloud::{CloudShadowClient, StatusRequestCallback};
pub use config::{AgentConfig, CertificatePaths, CertificateProvisioner, TlsMaterial};
pub use engine::{
    CheckOutcome, EngineConfig, EngineHandle, EngineState, ReconciliationEngine, Trigger,
};
pub use error::{
    ConfigError, ConnectError, DecodeError, Error, PublishError, Result, SensorError,
    UnrecoverableConnectionError,
};
pub use scheduler::PeriodicScheduler;
pub use sensor::{
    ChangeCallback, CurrentThresholdSensor, GpioSysfsSensor, MockPowerSensor, PowerSensor,
};
pub use shadow::{ShadowCodec, ShadowTopics, ShadowUpdate};
#[cfg(feature = "balena")]
pub use supervisor::BalenaSupervisor;
pub use supervisor::{
    CommandReboot, ConnectionStatus, ConnectionSupervisor, RebootHandler, RetryPolicy, RetryState,
};
pub use types::PowerState;
