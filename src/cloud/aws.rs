// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AWS IoT classic shadow client over MQTT.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use detectordag_edge::cloud::{AwsIotShadowClient, CloudShadowClient};
//! use detectordag_edge::config::CertificatePaths;
//! use detectordag_edge::shadow::ShadowCodec;
//! use detectordag_edge::types::PowerState;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls = CertificatePaths::in_dir("/data/certs").load()?;
//! let client = AwsIotShadowClient::builder()
//!     .endpoint("example-ats.iot.eu-west-1.amazonaws.com")
//!     .thing_name("92f59eeb298c4f8c8773e4704d9afe74")
//!     .tls(tls)
//!     .build()?;
//!
//! client.connect().await?;
//! client
//!     .publish_shadow_update(&ShadowCodec::encode(PowerState::On), Duration::from_secs(5))
//!     .await?;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{CloudShadowClient, StatusRequestCallback};
use crate::config::{DEFAULT_PORT, TlsMaterial};
use crate::error::{ConfigError, ConnectError, PublishError};
use crate::shadow::{ShadowCodec, ShadowTopics};

/// How long a disconnect waits for the event loop to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 10;

/// Outcome of a shadow update as reported by the shadow service.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Confirmation {
    Accepted,
    Rejected { code: u16, message: String },
}

impl Confirmation {
    fn into_result(self) -> Result<(), PublishError> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected { code, message } => Err(PublishError::Rejected { code, message }),
        }
    }
}

/// A message from `update/accepted` or `update/rejected`, keyed by the
/// `clientToken` the shadow service echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ShadowResponse {
    client_token: Option<String>,
    confirmation: Confirmation,
}

/// Fields read from a shadow response document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBody {
    #[serde(default)]
    client_token: Option<String>,
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl ShadowResponse {
    fn accepted(payload: &[u8]) -> Self {
        Self {
            client_token: serde_json::from_slice::<ResponseBody>(payload)
                .ok()
                .and_then(|body| body.client_token),
            confirmation: Confirmation::Accepted,
        }
    }

    fn rejected(payload: &[u8]) -> Self {
        match serde_json::from_slice::<ResponseBody>(payload) {
            Ok(body) => Self {
                client_token: body.client_token,
                confirmation: Confirmation::Rejected {
                    code: body.code,
                    message: body.message,
                },
            },
            Err(e) => Self {
                client_token: None,
                confirmation: Confirmation::Rejected {
                    code: 0,
                    message: format!("unreadable rejection: {e}"),
                },
            },
        }
    }
}

/// Adds `clientToken` to a shadow update document.
fn with_client_token(payload: &[u8], token: &str) -> Result<Vec<u8>, PublishError> {
    let mut document: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| PublishError::InvalidPayload(e.to_string()))?;
    let Some(fields) = document.as_object_mut() else {
        return Err(PublishError::InvalidPayload(
            "update document is not a JSON object".to_string(),
        ));
    };
    fields.insert(
        "clientToken".to_string(),
        serde_json::Value::String(token.to_string()),
    );
    Ok(document.to_string().into_bytes())
}

/// Waits for the response carrying `token`, skipping any other.
async fn await_confirmation(
    responses: &mut mpsc::UnboundedReceiver<ShadowResponse>,
    token: &str,
    timeout: Duration,
) -> Result<(), PublishError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, responses.recv()).await {
            Ok(Some(response)) if response.client_token.as_deref() == Some(token) => {
                return response.confirmation.into_result();
            }
            Ok(Some(response)) => {
                tracing::debug!(
                    client_token = ?response.client_token,
                    "Ignoring response to another shadow update"
                );
            }
            Ok(None) => return Err(PublishError::NotConnected),
            Err(_) => return Err(PublishError::Timeout(timeout)),
        }
    }
}

/// Connection settings for [`AwsIotShadowClient`].
#[derive(Debug, Clone)]
struct ShadowClientConfig {
    endpoint: String,
    port: u16,
    thing_name: String,
    client_id: Option<String>,
    keep_alive: Duration,
    connect_timeout: Duration,
    tls: Option<TlsMaterial>,
    topics: Option<ShadowTopics>,
}

impl Default for ShadowClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            port: DEFAULT_PORT,
            thing_name: String::new(),
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tls: None,
            topics: None,
        }
    }
}

/// State shared between the client and its event loop task.
struct Shared {
    topics: ShadowTopics,
    connected: AtomicBool,
    responses_tx: mpsc::UnboundedSender<ShadowResponse>,
    pending_token: Mutex<Option<String>>,
    status_callback: RwLock<Option<StatusRequestCallback>>,
}

impl Shared {
    fn route_message(&self, topic: &str, payload: &[u8]) {
        if topic == self.topics.accepted() {
            self.forward_response(topic, ShadowResponse::accepted(payload));
        } else if topic == self.topics.rejected() {
            self.forward_response(topic, ShadowResponse::rejected(payload));
        } else if topic == self.topics.status_request() {
            self.on_status_request(payload);
        } else {
            tracing::debug!(topic, "Ignoring message on unexpected topic");
        }
    }

    // Only responses to the update in flight are forwarded.
    fn forward_response(&self, topic: &str, response: ShadowResponse) {
        let pending = self.pending_token.lock().clone();
        if pending.is_none() || response.client_token != pending {
            tracing::trace!(topic, ?response, "Shadow response not for us");
            return;
        }
        tracing::debug!(topic, ?response, "Shadow update confirmed");
        let _ = self.responses_tx.send(response);
    }

    fn on_status_request(&self, payload: &[u8]) {
        if payload.is_empty() {
            tracing::info!("Status requested");
        } else {
            match ShadowCodec::decode(payload) {
                Ok(remote) => tracing::info!(remote = %remote, "Status requested"),
                Err(e) => tracing::warn!(error = %e, "Status request carried an unreadable payload"),
            }
        }

        let callback = self.status_callback.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
}

/// A [`CloudShadowClient`] for the AWS IoT classic device shadow.
///
/// Each [`connect`](CloudShadowClient::connect) opens a fresh MQTT session
/// and subscribes to the update confirmation topics and the status request
/// topic. The event loop task runs until the broker goes away or
/// [`disconnect`](CloudShadowClient::disconnect) is called; it never
/// reconnects on its own.
pub struct AwsIotShadowClient {
    config: ShadowClientConfig,
    shared: Arc<Shared>,
    responses_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ShadowResponse>>,
    session: Mutex<Option<Session>>,
}

impl AwsIotShadowClient {
    /// Creates a new builder for configuring a shadow client.
    #[must_use]
    pub fn builder() -> AwsIotShadowClientBuilder {
        AwsIotShadowClientBuilder::default()
    }

    /// Returns the thing name this client reports for.
    #[must_use]
    pub fn thing_name(&self) -> &str {
        &self.config.thing_name
    }

    /// Returns the topics this client uses.
    #[must_use]
    pub fn topics(&self) -> &ShadowTopics {
        &self.shared.topics
    }

    fn client_id(&self) -> &str {
        self.config
            .client_id
            .as_deref()
            .unwrap_or(&self.config.thing_name)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id(), &self.config.endpoint, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);

        if let Some(tls) = &self.config.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca: tls.ca.clone(),
                alpn: None,
                client_auth: Some((tls.client_cert.clone(), tls.client_key.clone())),
            }));
        }

        options
    }

    fn take_session(&self) -> Option<Session> {
        self.shared.connected.store(false, Ordering::Release);
        self.session.lock().take()
    }

    fn live_client(&self) -> Option<AsyncClient> {
        if !self.is_connected() {
            return None;
        }
        self.session.lock().as_ref().map(|session| session.client.clone())
    }
}

impl CloudShadowClient for AwsIotShadowClient {
    async fn connect(&self) -> Result<(), ConnectError> {
        if let Some(stale) = self.take_session() {
            stale.task.abort();
        }

        let (client, event_loop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);
        let (connack_tx, connack_rx) = oneshot::channel();
        let task = tokio::spawn(handle_shadow_events(
            event_loop,
            Arc::clone(&self.shared),
            connack_tx,
        ));

        let timeout = self.config.connect_timeout;
        let outcome = match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(ConnectError::ConnectionFailed(reason)),
            Ok(Err(_)) => Err(ConnectError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => Err(ConnectError::Timeout(timeout)),
        };
        if let Err(e) = outcome {
            task.abort();
            return Err(e);
        }

        let topics = &self.shared.topics;
        for topic in [topics.accepted(), topics.rejected(), topics.status_request()] {
            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                task.abort();
                return Err(e.into());
            }
        }

        tracing::info!(
            endpoint = %self.config.endpoint,
            port = self.config.port,
            thing = %self.config.thing_name,
            tls = self.config.tls.is_some(),
            "Connected to shadow service"
        );

        *self.session.lock() = Some(Session { client, task });
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(mut session) = self.take_session() else {
            return;
        };

        if let Err(e) = session.client.disconnect().await {
            tracing::debug!(error = %e, "Disconnect request not delivered");
        }
        if tokio::time::timeout(DISCONNECT_GRACE, &mut session.task)
            .await
            .is_err()
        {
            session.task.abort();
        }

        tracing::info!(thing = %self.config.thing_name, "Disconnected from shadow service");
    }

    async fn publish_shadow_update(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), PublishError> {
        let client = self.live_client().ok_or(PublishError::NotConnected)?;
        let token = uuid::Uuid::new_v4().to_string();
        let document = with_client_token(payload, &token)?;

        let mut responses = self.responses_rx.lock().await;
        // Confirmations left over from an earlier timed-out update
        while responses.try_recv().is_ok() {}
        *self.shared.pending_token.lock() = Some(token.clone());

        let result = match client
            .publish(self.shared.topics.update(), QoS::AtLeastOnce, false, document)
            .await
        {
            Ok(()) => await_confirmation(&mut responses, &token, timeout).await,
            Err(e) => Err(e.into()),
        };

        *self.shared.pending_token.lock() = None;
        result
    }

    fn subscribe_status_requests(&self, callback: StatusRequestCallback) {
        *self.shared.status_callback.write() = Some(callback);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

impl Drop for AwsIotShadowClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.task.abort();
        }
    }
}

impl std::fmt::Debug for AwsIotShadowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsIotShadowClient")
            .field("endpoint", &self.config.endpoint)
            .field("port", &self.config.port)
            .field("thing_name", &self.config.thing_name)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AwsIotShadowClient`].
#[derive(Debug, Default)]
pub struct AwsIotShadowClientBuilder {
    config: ShadowClientConfig,
}

impl AwsIotShadowClientBuilder {
    /// Sets the broker endpoint host.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Sets the broker port (default: 8883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the thing name.
    #[must_use]
    pub fn thing_name(mut self, thing_name: impl Into<String>) -> Self {
        self.config.thing_name = thing_name.into();
        self
    }

    /// Overrides the MQTT client id (default: the thing name).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = duration;
        self
    }

    /// Enables mutual TLS with the given material.
    ///
    /// Without it the client speaks plain MQTT, which only local brokers
    /// accept.
    #[must_use]
    pub fn tls(mut self, material: TlsMaterial) -> Self {
        self.config.tls = Some(material);
        self
    }

    /// Overrides the topic set (default: derived from the thing name).
    #[must_use]
    pub fn topics(mut self, topics: ShadowTopics) -> Self {
        self.config.topics = Some(topics);
        self
    }

    /// Builds the client. No connection is made until
    /// [`connect`](CloudShadowClient::connect).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the endpoint or thing name is not set.
    pub fn build(self) -> Result<AwsIotShadowClient, ConfigError> {
        if self.config.endpoint.is_empty() {
            return Err(ConfigError::Missing("endpoint"));
        }
        if self.config.thing_name.is_empty() {
            return Err(ConfigError::Missing("thing_name"));
        }

        let topics = self
            .config
            .topics
            .clone()
            .unwrap_or_else(|| ShadowTopics::for_thing(&self.config.thing_name));
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();

        Ok(AwsIotShadowClient {
            shared: Arc::new(Shared {
                topics,
                connected: AtomicBool::new(false),
                responses_tx,
                pending_token: Mutex::new(None),
                status_callback: RwLock::new(None),
            }),
            responses_rx: tokio::sync::Mutex::new(responses_rx),
            session: Mutex::new(None),
            config: self.config,
        })
    }
}

/// Drives one MQTT session until it ends.
async fn handle_shadow_events(
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    connack_tx: oneshot::Sender<Result<(), String>>,
) {
    let mut connack_tx = Some(connack_tx);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connection acknowledged");
                let result = if connack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("broker refused connection: {:?}", connack.code))
                };
                let refused = result.is_err();
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(result);
                }
                if refused {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.route_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker closed the MQTT session");
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT session closed locally");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                match connack_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e.to_string()));
                    }
                    None => tracing::warn!(error = %e, "MQTT connection lost"),
                }
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PowerState;

    const ACCEPTED: &str = "$aws/things/dag-01/shadow/update/accepted";
    const REJECTED: &str = "$aws/things/dag-01/shadow/update/rejected";

    fn client() -> AwsIotShadowClient {
        AwsIotShadowClient::builder()
            .endpoint("localhost")
            .thing_name("dag-01")
            .build()
            .unwrap()
    }

    /// Installs a session whose event loop is never driven; publishes
    /// queue in the request channel.
    fn attach_session(client: &AwsIotShadowClient) -> EventLoop {
        let (mqtt, event_loop) =
            AsyncClient::new(MqttOptions::new("dag-01", "localhost", 1883), REQUEST_CAPACITY);
        *client.session.lock() = Some(Session {
            client: mqtt,
            task: tokio::spawn(async {}),
        });
        client.shared.connected.store(true, Ordering::Release);
        event_loop
    }

    fn pending_token(client: &AwsIotShadowClient) -> String {
        client.shared.pending_token.lock().clone().unwrap()
    }

    fn response(token: Option<&str>, confirmation: Confirmation) -> ShadowResponse {
        ShadowResponse {
            client_token: token.map(str::to_string),
            confirmation,
        }
    }

    #[test]
    fn builder_default_values() {
        let builder = AwsIotShadowClientBuilder::default();
        assert_eq!(builder.config.port, 8883);
        assert!(builder.config.endpoint.is_empty());
        assert!(builder.config.tls.is_none());
        assert_eq!(builder.config.keep_alive, Duration::from_secs(30));
        assert_eq!(builder.config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_requires_endpoint_and_thing() {
        assert!(matches!(
            AwsIotShadowClient::builder().thing_name("dag").build(),
            Err(ConfigError::Missing("endpoint"))
        ));
        assert!(matches!(
            AwsIotShadowClient::builder().endpoint("localhost").build(),
            Err(ConfigError::Missing("thing_name"))
        ));
    }

    #[test]
    fn client_id_defaults_to_thing_name() {
        let client = client();
        assert_eq!(client.client_id(), "dag-01");
        assert_eq!(client.topics().update(), "$aws/things/dag-01/shadow/update");

        let client = AwsIotShadowClient::builder()
            .endpoint("localhost")
            .thing_name("dag-01")
            .client_id("dag-01-test")
            .build()
            .unwrap();
        assert_eq!(client.client_id(), "dag-01-test");
    }

    #[test]
    fn rejection_body_is_parsed() {
        let response = ShadowResponse::rejected(
            br#"{"code":400,"message":"Missing required node: state","clientToken":"t-1"}"#,
        );
        assert_eq!(response.client_token.as_deref(), Some("t-1"));
        assert_eq!(
            response.confirmation,
            Confirmation::Rejected {
                code: 400,
                message: "Missing required node: state".to_string()
            }
        );

        let garbage = ShadowResponse::rejected(b"garbage");
        assert!(garbage.client_token.is_none());
        assert!(matches!(
            garbage.confirmation,
            Confirmation::Rejected { code: 0, .. }
        ));
    }

    #[test]
    fn accepted_body_yields_token() {
        let response = ShadowResponse::accepted(
            br#"{"state":{"reported":{"status":true}},"version":7,"clientToken":"t-2"}"#,
        );
        assert_eq!(response.client_token.as_deref(), Some("t-2"));
        assert_eq!(response.confirmation, Confirmation::Accepted);

        assert!(ShadowResponse::accepted(b"{}").client_token.is_none());
        assert!(ShadowResponse::accepted(b"").client_token.is_none());
    }

    #[test]
    fn update_document_carries_client_token() {
        let document = with_client_token(&ShadowCodec::encode(PowerState::Off), "t-3").unwrap();

        let value: serde_json::Value = serde_json::from_slice(&document).unwrap();
        assert_eq!(value["clientToken"], "t-3");
        assert_eq!(ShadowCodec::decode(&document).unwrap(), PowerState::Off);

        assert!(matches!(
            with_client_token(b"[1, 2]", "t-3"),
            Err(PublishError::InvalidPayload(_))
        ));
        assert!(matches!(
            with_client_token(b"not json", "t-3"),
            Err(PublishError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn routes_confirmations_and_status_requests() {
        let client = client();
        let requests = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        client.subscribe_status_requests(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let shared = &client.shared;
        // Nothing in flight, so confirmations are dropped
        shared.route_message(ACCEPTED, br#"{"clientToken":"t-1"}"#);

        *shared.pending_token.lock() = Some("t-1".to_string());
        shared.route_message(ACCEPTED, br#"{"clientToken":"t-1"}"#);
        shared.route_message(ACCEPTED, br#"{"clientToken":"backend-1"}"#);
        shared.route_message(ACCEPTED, b"{}");
        shared.route_message(
            REJECTED,
            br#"{"code":409,"message":"Version conflict","clientToken":"t-1"}"#,
        );
        shared.route_message("detectordag/dag-01/status/request", b"");
        shared.route_message("detectordag/dag-01/status/request", b"not json");
        shared.route_message("somewhere/else", b"{}");

        let mut responses = client.responses_rx.lock().await;
        assert_eq!(
            responses.try_recv().unwrap().confirmation,
            Confirmation::Accepted
        );
        assert!(matches!(
            responses.try_recv().unwrap().confirmation,
            Confirmation::Rejected { code: 409, .. }
        ));
        assert!(responses.try_recv().is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_wait_skips_other_tokens() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(response(Some("old"), Confirmation::Accepted)).unwrap();
        tx.send(response(None, Confirmation::Accepted)).unwrap();
        tx.send(response(
            Some("new"),
            Confirmation::Rejected {
                code: 409,
                message: "Version conflict".to_string(),
            },
        ))
        .unwrap();

        let result = await_confirmation(&mut rx, "new", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(PublishError::Rejected { code: 409, .. })));

        tx.send(response(Some("old"), Confirmation::Accepted)).unwrap();
        let result = await_confirmation(&mut rx, "new", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(PublishError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn matching_accepted_confirms_update() {
        let client = client();
        let _event_loop = attach_session(&client);

        let doc = ShadowCodec::encode(PowerState::On);
        let (result, ()) = tokio::join!(
            client.publish_shadow_update(&doc, Duration::from_secs(5)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let body = format!(r#"{{"clientToken":"{}"}}"#, pending_token(&client));
                client.shared.route_message(ACCEPTED, body.as_bytes());
            }
        );

        result.unwrap();
        assert!(client.shared.pending_token.lock().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_accepted_does_not_confirm_update() {
        let client = client();
        let _event_loop = attach_session(&client);
        let timeout = Duration::from_secs(5);

        let doc = ShadowCodec::encode(PowerState::On);
        let (result, ()) = tokio::join!(
            client.publish_shadow_update(&doc, timeout),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                client.shared.route_message(
                    ACCEPTED,
                    br#"{"state":{"desired":{"status":false}},"clientToken":"backend-1"}"#,
                );
                client
                    .shared
                    .route_message(ACCEPTED, br#"{"state":{"reported":{"status":true}}}"#);
            }
        );

        assert!(matches!(result, Err(PublishError::Timeout(t)) if t == timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn late_accepted_from_timed_out_update_is_ignored() {
        let client = client();
        let _event_loop = attach_session(&client);
        let timeout = Duration::from_secs(1);

        let on_doc = ShadowCodec::encode(PowerState::On);
        let (first, stale_token) = tokio::join!(
            client.publish_shadow_update(&on_doc, timeout),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                pending_token(&client)
            }
        );
        assert!(matches!(first, Err(PublishError::Timeout(_))));

        let off_doc = ShadowCodec::encode(PowerState::Off);
        let (second, ()) = tokio::join!(
            client.publish_shadow_update(&off_doc, timeout),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                assert_ne!(pending_token(&client), stale_token);
                let body = format!(r#"{{"clientToken":"{stale_token}"}}"#);
                client.shared.route_message(ACCEPTED, body.as_bytes());
            }
        );
        assert!(matches!(second, Err(PublishError::Timeout(t)) if t == timeout));
    }

    #[tokio::test]
    async fn publish_without_session_is_not_connected() {
        let client = client();
        assert!(!client.is_connected());

        let result = client
            .publish_shadow_update(b"{}", Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(PublishError::NotConnected)));

        // Disconnect without a session is a no-op
        client.disconnect().await;
    }
}
