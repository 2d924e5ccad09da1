// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use detectordag_edge::cloud::AwsIotShadowClient;
use detectordag_edge::config::{AgentConfig, CertificatePaths, CertificateProvisioner};
use detectordag_edge::engine::{EngineState, ReconciliationEngine};
use detectordag_edge::sensor::{
    CurrentThresholdSensor, GpioSysfsSensor, MockPowerSensor, PowerSensor,
};
use detectordag_edge::supervisor::{
    BalenaSupervisor, CommandReboot, ConnectionSupervisor, RebootHandler,
};
use detectordag_edge::types::PowerState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Mode};

const CERT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Reboot mechanism picked from the environment.
enum HostReboot {
    Balena(BalenaSupervisor),
    Command(CommandReboot),
}

impl HostReboot {
    fn from_env() -> Result<Self> {
        match BalenaSupervisor::from_env().context("failed to create supervisor client")? {
            Some(supervisor) => {
                info!("Reboots go through the balena supervisor");
                Ok(Self::Balena(supervisor))
            }
            None => {
                info!("No balena supervisor, reboots run the reboot command");
                Ok(Self::Command(CommandReboot::default()))
            }
        }
    }
}

impl RebootHandler for HostReboot {
    async fn request_reboot(&self) {
        match self {
            Self::Balena(supervisor) => supervisor.request_reboot().await,
            Self::Command(command) => command.request_reboot().await,
        }
    }
}

type Supervisor = ConnectionSupervisor<AwsIotShadowClient, HostReboot>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or(
            EnvFilter::default()
                .add_directive("info".parse()?)
                .add_directive("rumqttc=warn".parse()?),
        ))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let cli = Cli::parse();
    let config = cli.agent_config();
    config.validate().context("invalid configuration")?;
    info!(device = %config.device_id, endpoint = %config.endpoint, "Configuration loaded");

    let written = CertificateProvisioner::new(config.certs.clone())
        .provision_from_env()
        .context("failed to provision certificates")?;
    if written > 0 {
        info!(written, "Certificates provisioned from environment");
    }

    tokio::select! {
        () = wait_for_certificates(&config.certs) => {}
        () = shutdown_signal() => {
            info!("Shutdown requested while waiting for certificates");
            return Ok(());
        }
    }

    let supervisor = connect_supervisor(&config)?;

    match cli.mode {
        Mode::App { pin, active_low } => {
            let sensor = GpioSysfsSensor::new(pin).active_low(active_low);
            if let Err(e) = sensor.export() {
                warn!(pin, error = %e, "Could not export GPIO pin");
            }
            let engine = ReconciliationEngine::new(sensor, supervisor, config.engine_config());
            serve(engine).await
        }
        Mode::Current { input, threshold } => {
            let sensor = CurrentThresholdSensor::new(input).threshold_ma(threshold);
            if let Err(e) = sensor.read_ma() {
                warn!(
                    path = %sensor.path().display(),
                    error = %e,
                    "Current channel not readable yet"
                );
            }
            let engine = ReconciliationEngine::new(sensor, supervisor, config.engine_config());
            serve(engine).await
        }
        Mode::Mock => {
            let sensor = Arc::new(MockPowerSensor::new(PowerState::Off));
            let engine =
                ReconciliationEngine::new(Arc::clone(&sensor), supervisor, config.engine_config());
            tokio::spawn(drive_mock_sensor(sensor, engine.watch()));
            serve(engine).await
        }
    }
}

fn connect_supervisor(config: &AgentConfig) -> Result<Supervisor> {
    let tls = config.certs.load().context("failed to load certificates")?;
    let client = AwsIotShadowClient::builder()
        .endpoint(&config.endpoint)
        .port(config.port)
        .thing_name(&config.device_id)
        .keep_alive(config.keep_alive)
        .connect_timeout(config.connect_timeout)
        .topics(config.topics())
        .tls(tls)
        .build()
        .context("failed to create shadow client")?;

    Ok(ConnectionSupervisor::new(
        client,
        HostReboot::from_env()?,
        config.retry.clone(),
    ))
}

async fn serve<S: PowerSensor>(
    mut engine: ReconciliationEngine<S, AwsIotShadowClient, HostReboot>,
) -> Result<()> {
    if let Err(e) = engine.start().await {
        engine.shutdown().await;
        return Err(e).context("failed to start reconciliation engine");
    }

    engine
        .run_until(shutdown_signal())
        .await
        .context("reconciliation engine stopped")
}

async fn wait_for_certificates(paths: &CertificatePaths) {
    while !paths.are_present() {
        info!(
            root_ca = %paths.root_ca.display(),
            "Waiting for certificates"
        );
        tokio::time::sleep(CERT_POLL_INTERVAL).await;
    }
}

async fn drive_mock_sensor(sensor: Arc<MockPowerSensor>, state: watch::Receiver<EngineState>) {
    info!("Mock sensor ready: t toggles, h sets on, l sets off, s prints state");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        match line.trim() {
            "t" => {
                sensor.toggle();
            }
            "h" => sensor.high(),
            "l" => sensor.low(),
            "s" => match serde_json::to_string(&*state.borrow()) {
                Ok(json) => info!(state = %json, "Engine state"),
                Err(e) => warn!(error = %e, "Failed to serialize engine state"),
            },
            "" => {}
            other => warn!(input = other, "Unknown command, expected t, h, l or s"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
