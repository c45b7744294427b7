//! Per-connection delivery loop
//!
//! Each accepted socket gets its own `FanoutHub` subscription and a loop
//! that writes every message from that subscription to the socket. The loop
//! ends when the client goes away, a write fails, the hub evicts the
//! subscriber, or the process shuts down. A write to a client that has
//! stopped reading is abandoned as soon as the subscriber is evicted or
//! shutdown begins. Whatever the reason, the subscriber is deregistered and
//! the socket closed before returning.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::DownstreamConnection;
use crate::hub::{FanoutHub, SubscriberHandle};
use crate::transport::message::{frame_message, overflow_close, shutdown_close};
use crate::utils::error::{DownstreamWriteError, RecvError, SubscriberOverflowError};
use crate::utils::shutdown::Shutdown;

/// How long the farewell close frame and the socket close may take.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a delivery loop stopped.
#[derive(Debug)]
enum Ending {
    ClientClosed,
    ReadFailed(tungstenite::Error),
    WriteFailed(DownstreamWriteError),
    Overflow(SubscriberOverflowError),
    Deregistered,
    Shutdown,
}

/// Runs one delivery loop per accepted downstream connection.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    hub: FanoutHub,
    shutdown: Shutdown,
}

impl ConnectionManager {
    /// Delivery loops register with `hub` and stop when `shutdown` fires.
    pub fn new(hub: FanoutHub, shutdown: Shutdown) -> Self {
        Self { hub, shutdown }
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Upgrades a raw connection to WebSocket and relays to it until it
    /// closes.
    pub async fn on_accept<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%peer, error = %e, "WebSocket handshake error");
                return;
            }
        };
        self.deliver(ws_stream, peer).await;
    }

    /// Runs the delivery loop on an established WebSocket.
    pub async fn deliver<S>(&self, ws_stream: WebSocketStream<S>, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut handle = self.hub.register();
        let mut conn = DownstreamConnection::new(handle.id(), peer);
        info!(connection = %conn.id, %peer, "Downstream client connected");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut shutdown = self.shutdown.clone();

        let ending = loop {
            tokio::select! {
                biased;

                _ = shutdown.signalled() => break Ending::Shutdown,

                frame = ws_receiver.next() => match frame {
                    None | Some(Ok(WsMessage::Close(_))) => break Ending::ClientClosed,
                    Some(Err(e)) => break Ending::ReadFailed(e),
                    // Clients have nothing to say to the relay.
                    Some(Ok(_)) => {}
                },

                delivery = handle.recv() => match delivery {
                    Ok(message) => tokio::select! {
                        biased;

                        _ = shutdown.signalled() => break Ending::Shutdown,

                        _ = handle.removed() => break removal(&mut handle),

                        written = ws_sender.send(frame_message(&message)) => {
                            if let Err(source) = written {
                                break Ending::WriteFailed(DownstreamWriteError {
                                    connection: conn.id.clone(),
                                    source,
                                });
                            }
                            conn.record_delivery();
                        }
                    },
                    Err(RecvError::Overflow(e)) => break Ending::Overflow(e),
                    Err(RecvError::Closed) => break Ending::Deregistered,
                },
            }
        };

        conn.begin_close();
        self.hub.deregister(&conn.id);
        drop(handle);

        let farewell = match &ending {
            Ending::ClientClosed => {
                info!(connection = %conn.id, delivered = conn.delivered(), "Downstream client disconnected");
                None
            }
            Ending::ReadFailed(e) => {
                warn!(connection = %conn.id, error = %e, "Downstream read failed");
                None
            }
            Ending::WriteFailed(e) => {
                warn!(connection = %conn.id, error = %e, "Downstream write failed");
                None
            }
            Ending::Overflow(e) => {
                warn!(connection = %conn.id, error = %e, "Closing slow downstream client");
                Some(overflow_close())
            }
            Ending::Deregistered => {
                debug!(connection = %conn.id, "Subscription closed by hub");
                None
            }
            Ending::Shutdown => {
                debug!(connection = %conn.id, "Closing downstream client for shutdown");
                Some(shutdown_close())
            }
        };

        let closing = async {
            if let Some(frame) = farewell {
                if ws_sender.send(frame).await.is_err() {
                    return;
                }
            }
            let _ = ws_sender.close().await;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
            debug!(connection = %conn.id, "Client not reading, dropping socket");
        }
        drop(ws_sender);
        drop(ws_receiver);
        conn.mark_closed();
        debug!(connection = %conn.id, state = ?conn.state(), "Send loop closed");
    }
}

/// Why the hub let go of a handle, read once the handle is no longer active.
fn removal(handle: &mut SubscriberHandle) -> Ending {
    match handle.try_recv() {
        Err(RecvError::Overflow(e)) => Ending::Overflow(e),
        _ => Ending::Deregistered,
    }
}
