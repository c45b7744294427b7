//! The `transport` module is responsible for the downstream side of the
//! relay: the WebSocket server, the per-connection delivery loop, and how
//! relayed messages are framed on the wire.

pub mod connection;
pub mod message;
pub mod websocket;

pub use connection::ConnectionManager;
pub use websocket::{Server, start_websocket_server};
