//! The `hub` module multiplexes the single upstream message stream to any
//! number of downstream subscribers.

pub mod engine;
pub mod message;
pub mod registry;
pub mod subscriber;

pub use engine::FanoutHub;
pub use message::Message;
pub use subscriber::{SubscriberHandle, TapState};
