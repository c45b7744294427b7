//! The `error` module defines the error types used across the relay.
//!
//! Each failure mode has its own type so that callers can decide how far it
//! propagates: upstream errors stay with the relay orchestrator, downstream
//! errors stay with the single connection that produced them.

use std::io;

use thiserror::Error;

/// The broker could not be reached or refused the connection.
#[derive(Debug, Clone, Error)]
#[error("failed to connect to broker: {reason}")]
pub struct ConnectError {
    pub reason: String,
}

impl ConnectError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The broker rejected the topic subscription.
#[derive(Debug, Clone, Error)]
#[error("failed to subscribe to topic '{topic}': {cause}")]
pub struct SubscribeError {
    pub topic: String,
    pub cause: String,
}

impl SubscribeError {
    pub fn new(topic: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            cause: cause.into(),
        }
    }
}

/// Terminal signal of a `MessageStream`: the upstream session was lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream disconnected: {reason}")]
pub struct UpstreamDisconnect {
    pub reason: String,
}

impl UpstreamDisconnect {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A subscriber fell too far behind and was removed from the hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("subscriber {subscriber} exceeded its backlog of {backlog} messages")]
pub struct SubscriberOverflowError {
    pub subscriber: String,
    pub backlog: usize,
}

/// Writing to a downstream connection failed.
#[derive(Debug, Error)]
#[error("failed to write to connection {connection}: {source}")]
pub struct DownstreamWriteError {
    pub connection: String,
    #[source]
    pub source: tungstenite::Error,
}

/// Why a subscriber handle stopped yielding messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error(transparent)]
    Overflow(#[from] SubscriberOverflowError),
    #[error("subscription closed")]
    Closed,
}

/// Rejected configuration values.
#[derive(Debug, Clone, Error)]
#[error("invalid setting `{key}`: {reason}")]
pub struct SettingsError {
    pub key: &'static str,
    pub reason: String,
}

/// Fatal errors that end the relay process.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] io::Error),
}
