// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use detectordag_edge::config::{AgentConfig, DEFAULT_PORT};
use detectordag_edge::supervisor::RetryPolicy;

fn parse_seconds(s: &str) -> Result<Duration, ParseIntError> {
    let secs: u64 = s.parse()?;
    Ok(Duration::from_secs(secs))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Device identifier, used as the AWS IoT thing name
    #[arg(env = "BALENA_DEVICE_UUID", long = "device-id", value_name = "uuid")]
    pub device_id: Option<String>,

    /// AWS IoT endpoint host
    #[arg(env = "AWS_ENDPOINT", long = "endpoint", value_name = "host")]
    pub endpoint: Option<String>,

    /// AWS IoT endpoint port
    #[arg(env = "AWS_PORT", long = "port", value_name = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding root-CA.crt, thing.cert.pem and thing.private.key
    #[arg(env = "CERT_DIR", long = "cert-dir", value_name = "dir")]
    pub cert_dir: Option<PathBuf>,

    /// Freshness check period in seconds
    #[arg(
        env = "ALIVE_INTERVAL",
        long = "alive-interval",
        value_name = "s",
        value_parser = parse_seconds,
        default_value = "3600"
    )]
    pub poll_period: Duration,

    /// Republish unchanged state on a periodic check after this many seconds
    #[arg(
        env = "REPUBLISH_AFTER",
        long = "republish-after",
        value_name = "s",
        value_parser = parse_seconds
    )]
    pub republish_after: Option<Duration>,

    /// Consecutive failed connect attempts before requesting a reboot
    #[arg(
        env = "CONNECT_ATTEMPTS",
        long = "connect-attempts",
        value_name = "n",
        default_value_t = 5
    )]
    pub connect_attempts: u32,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Mode {
    /// Read power presence from a GPIO input
    App {
        /// GPIO pin wired to the power detector
        #[arg(env = "SENSOR_PIN", long = "pin", value_name = "n", default_value_t = 4)]
        pin: u32,

        /// Treat a low line as power present
        #[arg(long = "active-low")]
        active_low: bool,
    },
    /// Read power presence from a current monitor's hwmon channel
    Current {
        /// File reporting supply current in milliamps
        #[arg(
            env = "CURRENT_INPUT",
            long = "input",
            value_name = "path",
            default_value = "/sys/class/hwmon/hwmon0/curr1_input"
        )]
        input: PathBuf,

        /// Current in milliamps that must be exceeded for power to be present
        #[arg(
            env = "CURRENT_THRESHOLD",
            long = "threshold",
            value_name = "mA",
            default_value_t = 0.0
        )]
        threshold: f64,
    },
    /// Drive a simulated sensor from stdin (t: toggle, h: on, l: off, s: state)
    Mock,
}

impl Cli {
    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::new(
            self.device_id.clone().unwrap_or_default(),
            self.endpoint.clone().unwrap_or_default(),
        )
        .with_port(self.port)
        .with_poll_period(self.poll_period)
        .with_retry(RetryPolicy::default().with_max_attempts(self.connect_attempts));

        if let Some(dir) = &self.cert_dir {
            config = config.with_certs_dir(dir);
        }
        if let Some(age) = self.republish_after {
            config = config.with_republish_after(age);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_mode_defaults() {
        let cli = Cli::parse_from([
            "detectordag-edge",
            "--device-id",
            "92f59eeb298c4f8c8773e4704d9afe74",
            "--endpoint",
            "iot.example.com",
            "app",
        ]);
        assert!(matches!(cli.mode, Mode::App { pin: 4, active_low: false }));

        let config = cli.agent_config();
        assert_eq!(config.port, 8883);
        assert_eq!(config.poll_period, Duration::from_secs(3600));
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.republish_after.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "detectordag-edge",
            "--alive-interval",
            "60",
            "--republish-after",
            "86400",
            "--cert-dir",
            "/data/certs",
            "--connect-attempts",
            "3",
            "mock",
        ]);
        assert!(matches!(cli.mode, Mode::Mock));

        let config = cli.agent_config();
        assert_eq!(config.poll_period, Duration::from_secs(60));
        assert_eq!(config.republish_after, Some(Duration::from_secs(86_400)));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.certs.root_ca, PathBuf::from("/data/certs/root-CA.crt"));
    }

    #[test]
    fn current_mode_reads_channel_and_threshold() {
        let cli = Cli::parse_from([
            "detectordag-edge",
            "current",
            "--input",
            "/sys/class/hwmon/hwmon2/curr1_input",
            "--threshold",
            "25",
        ]);
        let Mode::Current { input, threshold } = cli.mode else {
            panic!("expected current mode");
        };
        assert_eq!(input, PathBuf::from("/sys/class/hwmon/hwmon2/curr1_input"));
        assert!((threshold - 25.0).abs() < f64::EPSILON);
    }
}
