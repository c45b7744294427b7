use std::net::SocketAddr;

use chrono::{DateTime, Utc};

/// Lifecycle of a downstream socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Represents one accepted downstream WebSocket client.
///
/// The id is the same as the client's subscriber id in the `FanoutHub`.
#[derive(Debug)]
pub struct DownstreamConnection {
    /// Unique identifier shared with the hub registration.
    pub id: String,

    /// Remote address of the client.
    pub peer: SocketAddr,

    pub connected_at: DateTime<Utc>,

    state: ConnectionState,
    delivered: u64,
}

impl DownstreamConnection {
    pub fn new(id: impl Into<String>, peer: SocketAddr) -> Self {
        Self {
            id: id.into(),
            peer,
            connected_at: Utc::now(),
            state: ConnectionState::Open,
            delivered: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of messages written to this client so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn record_delivery(&mut self) {
        self.delivered += 1;
    }

    pub fn begin_close(&mut self) {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }
}
