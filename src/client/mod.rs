//! The `client` module defines the representation of a downstream client.
//!
//! It provides the `DownstreamConnection` struct, which tracks the state of
//! a single accepted WebSocket connection while its delivery loop runs.

pub mod downstream;
pub use downstream::{ConnectionState, DownstreamConnection};
