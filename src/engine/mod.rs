// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status reconciliation between the power sensor and the cloud shadow.
//!
//! The [`ReconciliationEngine`] keeps the remote shadow in line with the
//! local power reading. Three independent sources ask it to check:
//!
//! - sensor edges, through the sensor's change callback
//! - periodic ticks, through a [`PeriodicScheduler`]
//! - status requests from the cloud, through the client's callback
//!
//! None of them touch engine state. They post a [`Trigger`] on a
//! single-consumer queue through an [`EngineHandle`], and the engine handles
//! triggers one at a time, so at most one publish is ever in flight.
//!
//! # Examples
//!
//! ```ignore
//! use detectordag_edge::engine::{EngineConfig, ReconciliationEngine};
//!
//! let mut engine = ReconciliationEngine::new(sensor, supervisor, EngineConfig::default());
//! engine.start().await?;
//! engine.run_until(tokio::signal::ctrl_c().map(drop)).await?;
//! ```

mod state;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub use state::{CheckOutcome, EngineConfig, EngineState, Trigger};

use crate::cloud::CloudShadowClient;
use crate::error::{Error, SchedulerError, UnrecoverableConnectionError};
use crate::scheduler::PeriodicScheduler;
use crate::sensor::PowerSensor;
use crate::shadow::ShadowCodec;
use crate::supervisor::{ConnectionSupervisor, RebootHandler};
use crate::types::PowerState;

/// Cheap, cloneable sender of reconciliation triggers.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl EngineHandle {
    /// Queues a check.
    ///
    /// # Errors
    ///
    /// Returns the trigger back if the engine has been dropped.
    pub fn trigger(&self, trigger: Trigger) -> Result<(), mpsc::error::SendError<Trigger>> {
        self.tx.send(trigger)
    }
}

/// Keeps the cloud shadow synchronized with the power sensor.
pub struct ReconciliationEngine<S, C, R> {
    sensor: S,
    supervisor: ConnectionSupervisor<C, R>,
    scheduler: PeriodicScheduler,
    config: EngineConfig,
    state: EngineState,
    last_publish_instant: Option<Instant>,
    state_tx: watch::Sender<EngineState>,
    trigger_tx: mpsc::UnboundedSender<Trigger>,
    trigger_rx: mpsc::UnboundedReceiver<Trigger>,
}

impl<S, C, R> ReconciliationEngine<S, C, R>
where
    S: PowerSensor,
    C: CloudShadowClient,
    R: RebootHandler,
{
    /// Creates an engine with no published state.
    pub fn new(sensor: S, supervisor: ConnectionSupervisor<C, R>, config: EngineConfig) -> Self {
        let state = EngineState {
            connection: supervisor.status(),
            ..EngineState::default()
        };
        let (state_tx, _) = watch::channel(state.clone());
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        Self {
            sensor,
            supervisor,
            scheduler: PeriodicScheduler::new(),
            config,
            state,
            last_publish_instant: None,
            state_tx,
            trigger_tx,
            trigger_rx,
        }
    }

    /// Returns a handle for posting triggers.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Returns the current engine state.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Creates a watch receiver for state updates.
    pub fn watch(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Returns the connection supervisor.
    pub fn supervisor(&self) -> &ConnectionSupervisor<C, R> {
        &self.supervisor
    }

    /// Returns the sensor.
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Returns true while periodic checks are scheduled.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Puts the engine in service.
    ///
    /// Wires the sensor and status request callbacks to the trigger queue,
    /// publishes the current reading unconditionally, then starts periodic
    /// checks. The first periodic check happens one poll period later.
    ///
    /// # Errors
    ///
    /// Returns `Error::Scheduler` if the engine was already started and
    /// `Error::Unrecoverable` if the connection could not be established.
    pub async fn start(&mut self) -> Result<CheckOutcome, Error> {
        if self.scheduler.is_running() {
            return Err(SchedulerError::AlreadyRunning.into());
        }

        let handle = self.handle();
        let pushes = self.sensor.on_change(Arc::new(move |state: PowerState| {
            tracing::debug!(status = %state, "Sensor edge");
            let _ = handle.trigger(Trigger::SensorEdge);
        }));
        if !pushes {
            tracing::info!("Sensor is poll-only, relying on periodic checks");
        }

        let handle = self.handle();
        self.supervisor
            .client()
            .subscribe_status_requests(Arc::new(move || {
                let _ = handle.trigger(Trigger::StatusRequest);
            }));

        let outcome = self.check_and_publish(Trigger::Startup).await?;

        let handle = self.handle();
        self.scheduler
            .start(self.config.poll_period, move || handle.trigger(Trigger::Tick))?;

        tracing::info!(
            poll_period = ?self.config.poll_period,
            republish_after = ?self.config.republish_after,
            "Reconciliation engine started"
        );
        Ok(outcome)
    }

    /// Reads the sensor and publishes if the shadow is stale.
    ///
    /// Startup and status-request triggers always publish. Other triggers
    /// publish only if the reading differs from the last confirmed state, or
    /// for ticks when the last publish is older than `republish_after`.
    /// `last_published` only moves on a confirmed publish.
    ///
    /// # Errors
    ///
    /// Returns `UnrecoverableConnectionError` when the connection retry
    /// ceiling was reached. Sensor and publish failures are absorbed and
    /// reported through the returned [`CheckOutcome`].
    pub async fn check_and_publish(
        &mut self,
        trigger: Trigger,
    ) -> Result<CheckOutcome, UnrecoverableConnectionError> {
        let current = match self.sensor.read() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(%trigger, error = %e, "Sensor read failed, skipping check");
                return Ok(CheckOutcome::SensorFailed);
            }
        };

        if !self.is_stale(trigger, current) {
            tracing::debug!(%trigger, status = %current, "Shadow up to date");
            return Ok(CheckOutcome::Unchanged(current));
        }

        let payload = ShadowCodec::encode(current);
        let result = self
            .supervisor
            .publish(&payload, self.config.operation_timeout)
            .await;
        self.state.connection = self.supervisor.status();

        let outcome = match result {
            Ok(()) => {
                self.state.last_published = Some(current);
                self.state.last_published_at = Some(Utc::now());
                self.state.publish_count += 1;
                self.last_publish_instant = Some(Instant::now());
                tracing::info!(%trigger, status = %current, "Published shadow update");
                CheckOutcome::Published(current)
            }
            Err(Error::Unrecoverable(e)) => {
                self.notify();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    %trigger,
                    status = %current,
                    error = %e,
                    "Shadow update failed, next check will retry"
                );
                CheckOutcome::PublishFailed(current)
            }
        };

        self.notify();
        Ok(outcome)
    }

    fn is_stale(&self, trigger: Trigger, current: PowerState) -> bool {
        if trigger.is_forced() || self.state.last_published != Some(current) {
            return true;
        }

        trigger == Trigger::Tick
            && self.config.republish_after.is_some_and(|age| {
                self.last_publish_instant
                    .is_none_or(|published| published.elapsed() >= age)
            })
    }

    fn notify(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    /// Handles every trigger already queued, without waiting for more.
    ///
    /// # Errors
    ///
    /// Returns `UnrecoverableConnectionError` as soon as a check raises it;
    /// remaining triggers stay queued.
    pub async fn process_pending(
        &mut self,
    ) -> Result<Vec<CheckOutcome>, UnrecoverableConnectionError> {
        let mut outcomes = Vec::new();
        while let Ok(trigger) = self.trigger_rx.try_recv() {
            outcomes.push(self.check_and_publish(trigger).await?);
        }
        Ok(outcomes)
    }

    /// Handles triggers until `shutdown` completes, then shuts down.
    ///
    /// A check in progress when `shutdown` completes runs to completion.
    /// The scheduler is stopped and the connection closed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unrecoverable` if the connection was given up on.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let result = self.run_loop(shutdown).await;
        self.shutdown().await;
        result
    }

    async fn run_loop<F>(&mut self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    return Ok(());
                }
                trigger = self.trigger_rx.recv() => {
                    let Some(trigger) = trigger else {
                        return Ok(());
                    };
                    self.check_and_publish(trigger).await?;
                }
            }
        }
    }

    /// Stops periodic checks and closes the connection.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.scheduler.stop();
        self.supervisor.disconnect().await;
        self.state.connection = self.supervisor.status();
        self.notify();
        tracing::info!(publishes = self.state.publish_count, "Reconciliation engine stopped");
    }
}

impl<S, C, R> std::fmt::Debug for ReconciliationEngine<S, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
