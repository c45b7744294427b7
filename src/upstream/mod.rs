//! The `upstream` module owns the broker side of the relay: connecting,
//! subscribing to the topic, and exposing inbound messages as a
//! [`MessageStream`].

pub mod mqtt;
pub mod source;
pub mod stream;

pub use mqtt::{BrokerEndpoint, MqttSource};
pub use source::{SessionState, UpstreamSource};
pub use stream::{MessageStream, UpstreamFeed, message_stream};

#[cfg(test)]
mod tests;
