//! MQTT upstream
//!
//! `rumqttc` does the protocol and TLS work. This module only:
//! - turns the configured broker URI into connection options
//! - waits for CONNACK / SUBACK so failures surface as typed errors
//! - runs a background pump that forwards PUBLISH payloads into a
//!   `MessageStream` and ends it with a disconnect when the link drops
//!
//! Retained messages the broker replays on SUBSCRIBE were published before
//! this subscription existed and are not forwarded.
//!
//! `rumqttc` would reconnect on the next `poll` after an error. The pump
//! stops polling instead, so reconnect policy stays with the relay.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish,
    QoS, SubscribeReasonCode, Transport,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::UpstreamSettings;
use crate::upstream::source::{SessionState, UpstreamSource};
use crate::upstream::stream::{MessageStream, UpstreamFeed, message_stream};
use crate::utils::error::{ConnectError, SubscribeError};

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;
const REQUEST_CAPACITY: usize = 64;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Where and how to reach the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerEndpoint {
    /// Parses `mqtt://`, `tcp://`, `mqtts://`, `ssl://` or `tls://` URIs.
    ///
    /// A URI without a scheme is dialled over TLS.
    pub fn parse(uri: &str) -> Result<Self, ConnectError> {
        let uri = uri.trim();
        let url = if uri.contains("://") {
            Url::parse(uri)
        } else {
            Url::parse(&format!("mqtts://{uri}"))
        }
        .map_err(|e| ConnectError::new(format!("invalid broker uri '{uri}': {e}")))?;

        let (tls, default_port) = match url.scheme() {
            "mqtt" | "tcp" => (false, PLAIN_PORT),
            "mqtts" | "ssl" | "tls" => (true, TLS_PORT),
            other => {
                return Err(ConnectError::new(format!(
                    "unsupported broker scheme '{other}'"
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConnectError::new(format!("broker uri '{uri}' has no host")))?
            .to_string();

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let password = url.password().map(str::to_string);

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
            tls,
            username,
            password,
        })
    }

    /// Non-empty configured credentials replace any embedded in the URI.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        if !username.is_empty() {
            self.username = Some(username.to_string());
            self.password = Some(password.to_string());
        }
        self
    }
}

/// A connected, not yet subscribed, MQTT link.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// [`UpstreamSource`] backed by an MQTT broker.
///
/// Every `connect` opens a fresh clean session; nothing is carried over
/// from a previous link.
pub struct MqttSource {
    endpoint: BrokerEndpoint,
    client_id: String,
    keep_alive: Duration,
    state: Arc<watch::Sender<SessionState>>,
}

impl MqttSource {
    /// Creates a source for `endpoint`. Without a client id one is
    /// generated.
    pub fn new(endpoint: BrokerEndpoint, client_id: Option<String>, keep_alive: Duration) -> Self {
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("mqttrelay-{}", Uuid::new_v4()));
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            endpoint,
            client_id,
            keep_alive,
            state: Arc::new(state),
        }
    }

    /// Builds a source from the `upstream` settings section.
    pub fn from_settings(settings: &UpstreamSettings) -> Result<Self, ConnectError> {
        let endpoint = BrokerEndpoint::parse(&settings.uri)?
            .with_credentials(&settings.username, &settings.password);
        Ok(Self::new(
            endpoint,
            settings.client_id.clone(),
            Duration::from_secs(settings.keep_alive_secs),
        ))
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn session_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.endpoint.host.clone(),
            self.endpoint.port,
        );
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &self.endpoint.username {
            options.set_credentials(
                username.clone(),
                self.endpoint.password.clone().unwrap_or_default(),
            );
        }
        if self.endpoint.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

impl UpstreamSource for MqttSource {
    type Session = MqttSession;

    async fn connect(&self) -> Result<MqttSession, ConnectError> {
        self.state.send_replace(SessionState::Connecting);
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if matches!(ack.code, ConnectReturnCode::Success) {
                        break;
                    }
                    self.state.send_replace(SessionState::Failed);
                    return Err(ConnectError::new(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(event) => debug!(?event, "Ignoring event before CONNACK"),
                Err(e) => {
                    self.state.send_replace(SessionState::Failed);
                    return Err(ConnectError::new(e.to_string()));
                }
            }
        }

        info!(
            host = %self.endpoint.host,
            port = self.endpoint.port,
            tls = self.endpoint.tls,
            "Connected to broker"
        );
        Ok(MqttSession { client, eventloop })
    }

    async fn subscribe(
        &self,
        session: MqttSession,
        topic: &str,
    ) -> Result<MessageStream, SubscribeError> {
        let MqttSession {
            client,
            mut eventloop,
        } = session;

        if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
            self.state.send_replace(SessionState::Failed);
            return Err(SubscribeError::new(topic, e.to_string()));
        }

        let (feed, stream) = message_stream(topic);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        self.state.send_replace(SessionState::Failed);
                        return Err(SubscribeError::new(topic, "broker rejected the subscription"));
                    }
                    break;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => forward(&feed, publish),
                Ok(_) => {}
                Err(e) => {
                    self.state.send_replace(SessionState::Failed);
                    return Err(SubscribeError::new(topic, e.to_string()));
                }
            }
        }

        self.state.send_replace(SessionState::Subscribed);
        info!(topic, "Subscribed to broker topic");
        tokio::spawn(pump(client, eventloop, feed, self.state.clone()));
        Ok(stream)
    }
}

async fn pump(
    client: AsyncClient,
    mut eventloop: EventLoop,
    feed: UpstreamFeed,
    state: Arc<watch::Sender<SessionState>>,
) {
    let reason = loop {
        tokio::select! {
            _ = feed.closed() => {
                if client.try_disconnect().is_ok() {
                    send_disconnect(&mut eventloop).await;
                }
                break None;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => forward(&feed, publish),
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    break Some("broker sent DISCONNECT".to_string());
                }
                Ok(_) => {}
                Err(e) => break Some(e.to_string()),
            }
        }
    };

    state.send_replace(SessionState::Disconnected);
    match reason {
        Some(reason) => {
            warn!(%reason, "Broker connection lost");
            feed.disconnect(reason);
        }
        None => debug!("Message stream dropped, closed broker connection"),
    }
}

fn forward(feed: &UpstreamFeed, publish: Publish) {
    if publish.retain {
        debug!(topic = %publish.topic, "Skipping retained message");
        return;
    }
    feed.push(publish.payload);
}

/// Polls until the queued DISCONNECT has been written or the link fails.
async fn send_disconnect(eventloop: &mut EventLoop) {
    let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    if flushed.is_err() {
        debug!("Timed out sending DISCONNECT");
    }
}
