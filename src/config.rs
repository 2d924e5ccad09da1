// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Agent configuration and certificate material.
//!
//! [`AgentConfig`] gathers everything the agent needs to run and checks it
//! with [`validate`](AgentConfig::validate) before anything is constructed.
//! [`CertificateProvisioner`] materializes base64 certificate material from
//! the environment into the certificate directory, and [`CertificatePaths`]
//! loads it back for the TLS transport.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::shadow::ShadowTopics;
use crate::supervisor::RetryPolicy;

/// Default AWS IoT MQTT over TLS port.
pub const DEFAULT_PORT: u16 = 8883;

/// File name of the root certificate authority.
pub const ROOT_CA_FILE: &str = "root-CA.crt";
/// File name of the device certificate.
pub const DEVICE_CERT_FILE: &str = "thing.cert.pem";
/// File name of the device private key.
pub const PRIVATE_KEY_FILE: &str = "thing.private.key";

/// Environment variable holding the base64 root CA.
pub const ROOT_CERT_VAR: &str = "AWS_ROOT_CERT";
/// Environment variable holding the base64 device certificate.
pub const THING_CERT_VAR: &str = "AWS_THING_CERT";
/// Environment variable holding the base64 private key.
pub const PRIVATE_CERT_VAR: &str = "AWS_PRIVATE_CERT";

const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Complete configuration of the edge agent.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use detectordag_edge::config::AgentConfig;
///
/// let config = AgentConfig::new("92f59eeb298c4f8c8773e4704d9afe74", "example.iot.eu-west-1.amazonaws.com")
///     .with_poll_period(Duration::from_secs(60))
///     .with_certs_dir("/data/certs");
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.port, 8883);
/// assert_eq!(
///     config.topics().status_request(),
///     "detectordag/92f59eeb298c4f8c8773e4704d9afe74/status/request"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Device identifier, also used as the thing name and MQTT client id.
    pub device_id: String,
    /// Cloud MQTT endpoint host.
    pub endpoint: String,
    /// Cloud MQTT endpoint port.
    pub port: u16,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Period of the freshness check.
    pub poll_period: Duration,
    /// Time allowed for a publish to be confirmed.
    pub operation_timeout: Duration,
    /// Time allowed for a single connect attempt.
    pub connect_timeout: Duration,
    /// Connect retry policy.
    pub retry: RetryPolicy,
    /// Age after which a periodic check republishes an unchanged state.
    pub republish_after: Option<Duration>,
    /// Location of the TLS material.
    pub certs: CertificatePaths,
    /// Topic override for status requests.
    pub status_request_topic: Option<String>,
}

impl AgentConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new(device_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            endpoint: endpoint.into(),
            port: DEFAULT_PORT,
            keep_alive: Duration::from_secs(30),
            poll_period: Duration::from_secs(3600),
            operation_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            republish_after: None,
            certs: CertificatePaths::in_dir(CertificatePaths::default_dir()),
            status_request_topic: None,
        }
    }

    /// Sets the endpoint port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the MQTT keep-alive interval.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the freshness check period.
    #[must_use]
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Sets the publish confirmation timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the connect attempt timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the connect retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Republishes unchanged state on a periodic check once the last
    /// publish is older than `age`.
    #[must_use]
    pub fn with_republish_after(mut self, age: Duration) -> Self {
        self.republish_after = Some(age);
        self
    }

    /// Reads certificates from `dir` using the standard file names.
    #[must_use]
    pub fn with_certs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.certs = CertificatePaths::in_dir(dir);
        self
    }

    /// Overrides the status request topic.
    #[must_use]
    pub fn with_status_request_topic(mut self, topic: impl Into<String>) -> Self {
        self.status_request_topic = Some(topic.into());
        self
    }

    /// Returns the shadow topics for this device.
    #[must_use]
    pub fn topics(&self) -> ShadowTopics {
        match &self.status_request_topic {
            Some(topic) => ShadowTopics::with_status_request(&self.device_id, topic.clone()),
            None => ShadowTopics::for_thing(&self.device_id),
        }
    }

    /// Returns the reconciliation settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_period: self.poll_period,
            operation_timeout: self.operation_timeout,
            republish_after: self.republish_after,
        }
    }

    /// Checks that the configuration is complete and usable.
    ///
    /// Certificate files are not checked here; see
    /// [`CertificatePaths::load`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for an empty identifier or endpoint and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.is_empty() {
            return Err(ConfigError::Missing("device_id"));
        }
        uuid::Uuid::parse_str(&self.device_id).map_err(|e| ConfigError::Invalid {
            field: "device_id",
            reason: e.to_string(),
        })?;

        if self.endpoint.is_empty() {
            return Err(ConfigError::Missing("endpoint"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must be greater than zero"));
        }
        if self.keep_alive < MIN_KEEP_ALIVE {
            return Err(invalid("keep_alive", "must be at least 5 seconds"));
        }
        if self.poll_period.is_zero() {
            return Err(invalid("poll_period", "must be greater than zero"));
        }
        if self.operation_timeout.is_zero() {
            return Err(invalid("operation_timeout", "must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("connect_timeout", "must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must allow at least one attempt"));
        }
        if self.republish_after.is_some_and(|age| age.is_zero()) {
            return Err(invalid("republish_after", "must be greater than zero"));
        }
        if let Some(topic) = &self.status_request_topic
            && (topic.is_empty() || topic.contains(['+', '#']))
        {
            return Err(invalid(
                "status_request_topic",
                "must be a non-empty topic without wildcards",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// In-memory TLS material for a mutually authenticated connection.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    /// PEM root certificate authority.
    pub ca: Vec<u8>,
    /// PEM device certificate.
    pub client_cert: Vec<u8>,
    /// PEM device private key.
    pub client_key: Vec<u8>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca", &format_args!("{} bytes", self.ca.len()))
            .field("client_cert", &format_args!("{} bytes", self.client_cert.len()))
            .field("client_key", &"<redacted>")
            .finish()
    }
}

/// Locations of the three certificate files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    /// Root certificate authority.
    pub root_ca: PathBuf,
    /// Device certificate.
    pub device_cert: PathBuf,
    /// Device private key.
    pub private_key: PathBuf,
}

impl CertificatePaths {
    /// Uses the standard file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            root_ca: dir.join(ROOT_CA_FILE),
            device_cert: dir.join(DEVICE_CERT_FILE),
            private_key: dir.join(PRIVATE_KEY_FILE),
        }
    }

    /// Returns `~/.detectordag/certs`, or a relative fallback when there is
    /// no home directory.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".detectordag")
            .join("certs")
    }

    fn all(&self) -> [&Path; 3] {
        [&self.root_ca, &self.device_cert, &self.private_key]
    }

    /// Returns true if all three files exist.
    #[must_use]
    pub fn are_present(&self) -> bool {
        self.all().iter().all(|path| path.is_file())
    }

    /// Reads the certificate files into memory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CertificateMissing` for the first absent file
    /// and `ConfigError::Io` if a file cannot be read.
    pub fn load(&self) -> Result<TlsMaterial, ConfigError> {
        if let Some(missing) = self.all().into_iter().find(|path| !path.is_file()) {
            return Err(ConfigError::CertificateMissing(missing.to_path_buf()));
        }

        Ok(TlsMaterial {
            ca: read_file(&self.root_ca)?,
            client_cert: read_file(&self.device_cert)?,
            client_key: read_file(&self.private_key)?,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes base64 certificate material from the environment to disk.
///
/// # Examples
///
/// ```no_run
/// use detectordag_edge::config::{CertificatePaths, CertificateProvisioner};
///
/// # fn main() -> Result<(), detectordag_edge::error::ConfigError> {
/// let paths = CertificatePaths::in_dir("/data/certs");
/// let written = CertificateProvisioner::new(paths.clone()).provision_from_env()?;
/// println!("wrote {written} certificate files");
/// assert!(paths.are_present());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CertificateProvisioner {
    paths: CertificatePaths,
}

impl CertificateProvisioner {
    /// Creates a provisioner targeting `paths`.
    #[must_use]
    pub fn new(paths: CertificatePaths) -> Self {
        Self { paths }
    }

    /// Provisions from `AWS_ROOT_CERT`, `AWS_THING_CERT` and
    /// `AWS_PRIVATE_CERT`.
    ///
    /// # Errors
    ///
    /// See [`provision_with`](Self::provision_with).
    pub fn provision_from_env(&self) -> Result<usize, ConfigError> {
        self.provision_with(|var| std::env::var(var).ok())
    }

    /// Provisions using `lookup` to resolve variable names.
    ///
    /// Absent or empty variables are skipped and files that already exist
    /// are kept. Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Base64` if a value is not valid base64 and
    /// `ConfigError::Io` if a file cannot be written.
    pub fn provision_with<F>(&self, lookup: F) -> Result<usize, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            (ROOT_CERT_VAR, &self.paths.root_ca),
            (THING_CERT_VAR, &self.paths.device_cert),
            (PRIVATE_CERT_VAR, &self.paths.private_key),
        ];

        let mut written = 0;
        for (var, path) in targets {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Certificate already present");
                continue;
            }
            let Some(encoded) = lookup(var).filter(|value| !value.trim().is_empty()) else {
                continue;
            };

            let pem = STANDARD
                .decode(encoded.trim())
                .map_err(|source| ConfigError::Base64 { var, source })?;
            write_certificate(path, &pem)?;

            tracing::info!(var, path = %path.display(), "Provisioned certificate");
            written += 1;
        }

        Ok(written)
    }
}

fn write_certificate(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let io_error = |source: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_error)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const DEVICE_ID: &str = "92f59eeb298c4f8c8773e4704d9afe74";

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            Self(std::env::temp_dir().join(format!("certs-test-{}", uuid::Uuid::new_v4())))
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn env_with(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults() {
        let config = AgentConfig::new(DEVICE_ID, "iot.example.com");
        assert_eq!(config.port, 8883);
        assert_eq!(config.keep_alive, Duration::from_secs(30));
        assert_eq!(config.poll_period, Duration::from_secs(3600));
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.republish_after.is_none());
        assert!(config.certs.root_ca.ends_with(".detectordag/certs/root-CA.crt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn hyphenated_device_id_is_accepted() {
        let config = AgentConfig::new("92f59eeb-298c-4f8c-8773-e4704d9afe74", "iot.example.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_values_are_refused() {
        assert!(matches!(
            AgentConfig::new("", "iot.example.com").validate(),
            Err(ConfigError::Missing("device_id"))
        ));
        assert!(matches!(
            AgentConfig::new(DEVICE_ID, "").validate(),
            Err(ConfigError::Missing("endpoint"))
        ));
    }

    #[test]
    fn invalid_values_are_refused() {
        let base = AgentConfig::new(DEVICE_ID, "iot.example.com");
        let cases = [
            (AgentConfig::new("not-a-uuid", "iot.example.com"), "device_id"),
            (base.clone().with_port(0), "port"),
            (base.clone().with_keep_alive(Duration::from_secs(1)), "keep_alive"),
            (base.clone().with_poll_period(Duration::ZERO), "poll_period"),
            (base.clone().with_operation_timeout(Duration::ZERO), "operation_timeout"),
            (base.clone().with_connect_timeout(Duration::ZERO), "connect_timeout"),
            (
                base.clone().with_retry(RetryPolicy::new().with_max_attempts(0)),
                "retry.max_attempts",
            ),
            (base.clone().with_republish_after(Duration::ZERO), "republish_after"),
            (base.clone().with_status_request_topic("fleet/#"), "status_request_topic"),
        ];

        for (config, expected) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn engine_config_and_topics_follow_settings() {
        let config = AgentConfig::new(DEVICE_ID, "iot.example.com")
            .with_poll_period(Duration::from_secs(60))
            .with_republish_after(Duration::from_secs(86_400))
            .with_status_request_topic("fleet/requests");

        let engine = config.engine_config();
        assert_eq!(engine.poll_period, Duration::from_secs(60));
        assert_eq!(engine.operation_timeout, Duration::from_secs(5));
        assert_eq!(engine.republish_after, Some(Duration::from_secs(86_400)));
        assert_eq!(config.topics().status_request(), "fleet/requests");
    }

    #[test]
    fn provisioner_writes_decoded_material() {
        let dir = TempDir::new();
        let paths = CertificatePaths::in_dir(&dir.0);
        let provisioner = CertificateProvisioner::new(paths.clone());

        let lookup = env_with(&[
            (ROOT_CERT_VAR, &STANDARD.encode("root")),
            (THING_CERT_VAR, &STANDARD.encode("cert")),
            (PRIVATE_CERT_VAR, &STANDARD.encode("key")),
        ]);
        assert_eq!(provisioner.provision_with(&lookup).unwrap(), 3);
        assert!(paths.are_present());

        let material = paths.load().unwrap();
        assert_eq!(material.ca, b"root");
        assert_eq!(material.client_cert, b"cert");
        assert_eq!(material.client_key, b"key");

        // Existing files are kept
        assert_eq!(provisioner.provision_with(&lookup).unwrap(), 0);
    }

    #[test]
    fn provisioner_skips_absent_variables() {
        let dir = TempDir::new();
        let paths = CertificatePaths::in_dir(&dir.0);
        let provisioner = CertificateProvisioner::new(paths.clone());

        let written = provisioner
            .provision_with(env_with(&[(ROOT_CERT_VAR, &STANDARD.encode("root"))]))
            .unwrap();
        assert_eq!(written, 1);
        assert!(!paths.are_present());
        assert!(matches!(
            paths.load(),
            Err(ConfigError::CertificateMissing(path)) if path == paths.device_cert
        ));
    }

    #[test]
    fn provisioner_rejects_bad_base64() {
        let dir = TempDir::new();
        let provisioner = CertificateProvisioner::new(CertificatePaths::in_dir(&dir.0));

        let result = provisioner.provision_with(env_with(&[(THING_CERT_VAR, "%%%")]));
        assert!(matches!(
            result,
            Err(ConfigError::Base64 { var: THING_CERT_VAR, .. })
        ));
    }

    #[test]
    fn tls_material_debug_redacts_key() {
        let material = TlsMaterial {
            ca: vec![0; 4],
            client_cert: vec![0; 8],
            client_key: b"secret".to_vec(),
        };
        let debug = format!("{material:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret"));
    }
}
